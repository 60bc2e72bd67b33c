//! Wake word trigger integration tests
//!
//! Drives the state machine and detector with scripted gates and
//! recognizers; no audio hardware or models required.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use harken::voice::{
    DiscardReason, DrainReason, FrameFormat, Hypothesis, TriggerEvent, TriggerState,
    TriggerStateMachine, UtteranceBuffer, WakeMatcher, WakeWordDetector,
};

mod common;

use common::{
    FRAME_BYTES, Recorder, ScriptedGate, ScriptedRecognizer, frame, frame_ids, limits, machine,
};

fn partial(text: &str) -> Option<Hypothesis> {
    Some(Hypothesis::partial(text))
}

fn final_text(text: &str) -> Option<Hypothesis> {
    Some(Hypothesis::final_text(text))
}

#[test]
fn test_reference_frame_format() {
    let format = FrameFormat::new(16000, 10).unwrap();
    assert_eq!(format.samples_per_frame(), 160);
    assert_eq!(format.bytes_per_frame(), FRAME_BYTES);
}

#[test]
fn test_arms_on_exactly_the_nth_matching_partial() {
    for n in 1..=6_u32 {
        let mut m = machine(limits(n, 15, 500, 100));
        for i in 1..n {
            m.step(frame(1), true, partial("ok robot"));
            assert_eq!(m.state(), TriggerState::Idle, "armed early at frame {i} of {n}");
        }
        m.step(frame(2), true, partial("ok robot"));
        assert_eq!(m.state(), TriggerState::Armed, "not armed on frame {n}");
        assert_eq!(m.partial_hits(), 0);
        assert_eq!(m.buffered_frames(), 1);
    }
}

#[test]
fn test_silence_run_drains_including_silent_frames() {
    let recorder = Recorder::default();
    let mut m = machine(limits(3, 5, 500, 100)).with_observer(recorder.clone());

    assert!(m.step(frame(1), true, final_text("ok robot")).is_none());
    assert_eq!(m.state(), TriggerState::Confirmed);
    for id in 2..=4 {
        assert!(m.step(frame(id), true, None).is_none());
    }
    for id in 5..=8 {
        assert!(m.step(frame(id), false, None).is_none(), "drained early at {id}");
    }

    let pcm = m.step(frame(9), false, None).expect("fifth silent frame drains");
    assert_eq!(frame_ids(&pcm), (1..=9).collect::<Vec<_>>());
    assert_eq!(m.state(), TriggerState::Idle);
    assert_eq!(m.buffered_bytes(), 0);
    assert_eq!(m.partial_hits(), 0);

    assert_eq!(
        recorder.events(),
        vec![
            TriggerEvent::Armed,
            TriggerEvent::Confirmed {
                text: "ok robot".to_string()
            },
            TriggerEvent::Drained {
                bytes: 9 * FRAME_BYTES,
                reason: DrainReason::Silence,
            },
        ]
    );
}

#[test]
fn test_speech_interrupts_silence_run() {
    let mut m = machine(limits(3, 5, 500, 100));
    m.step(frame(1), true, final_text("ok robot"));

    for _ in 0..4 {
        assert!(m.step(frame(2), false, None).is_none());
    }
    assert!(m.step(frame(3), true, None).is_none());
    for _ in 0..4 {
        assert!(m.step(frame(4), false, None).is_none());
    }
    assert_eq!(m.state(), TriggerState::Confirmed);

    let pcm = m.step(frame(5), false, None).unwrap();
    assert_eq!(frame_ids(&pcm).len(), 11);
}

#[test]
fn test_unconfirmed_silence_discards() {
    let recorder = Recorder::default();
    let mut m = machine(limits(2, 3, 500, 100)).with_observer(recorder.clone());

    m.step(frame(1), true, partial("ok robot"));
    m.step(frame(2), true, partial("ok robot"));
    assert_eq!(m.state(), TriggerState::Armed);

    for _ in 0..3 {
        assert!(m.step(frame(3), false, None).is_none());
    }
    assert_eq!(m.state(), TriggerState::Idle);
    assert_eq!(m.buffered_bytes(), 0);
    assert_eq!(
        recorder.events().last(),
        Some(&TriggerEvent::Discarded {
            bytes: 4 * FRAME_BYTES,
            reason: DiscardReason::Unconfirmed,
        })
    );
}

#[test]
fn test_non_matching_final_keeps_state_and_resets_hits() {
    // Idle with pending hits
    let mut m = machine(limits(5, 15, 500, 100));
    m.step(frame(1), true, partial("ok robot"));
    m.step(frame(1), true, partial("ok robot"));
    assert_eq!(m.partial_hits(), 2);
    m.step(frame(1), true, final_text("hello there"));
    assert_eq!(m.state(), TriggerState::Idle);
    assert_eq!(m.partial_hits(), 0);

    // Armed
    let mut m = machine(limits(1, 15, 500, 100));
    m.step(frame(1), true, partial("ok robot"));
    m.step(frame(2), true, final_text("[unk]"));
    assert_eq!(m.state(), TriggerState::Armed);
    assert_eq!(m.partial_hits(), 0);
    assert_eq!(m.buffered_frames(), 2);

    // Confirmed
    m.step(frame(3), true, final_text("ok robot"));
    m.step(frame(4), true, final_text("good morning"));
    assert_eq!(m.state(), TriggerState::Confirmed);
}

#[test]
fn test_reference_scenario() {
    let recorder = Recorder::default();
    let mut m = machine(limits(3, 15, 500, 100)).with_observer(recorder.clone());
    let mut drains = Vec::new();

    for id in 1..=75_i16 {
        let speech = (6..=60).contains(&id);
        let hypothesis = match id {
            6..=8 => partial("ok robot"),
            20 => final_text("ok robot"),
            _ => None,
        };

        if let Some(pcm) = m.step(frame(id), speech, hypothesis) {
            drains.push((id, pcm));
        }

        match id {
            1..=7 => assert_eq!(m.state(), TriggerState::Idle, "frame {id}"),
            8..=19 => assert_eq!(m.state(), TriggerState::Armed, "frame {id}"),
            20..=74 => assert_eq!(m.state(), TriggerState::Confirmed, "frame {id}"),
            _ => assert_eq!(m.state(), TriggerState::Idle, "frame {id}"),
        }
    }

    assert_eq!(drains.len(), 1);
    let (at, pcm) = &drains[0];
    assert_eq!(*at, 75);
    // f8..f75 inclusive
    let ids = frame_ids(pcm);
    assert_eq!(ids, (8..=75).collect::<Vec<_>>());
    assert_eq!(ids.len(), 68);

    let kinds: Vec<&str> = recorder.events().iter().map(TriggerEvent::describe).collect();
    assert_eq!(
        kinds,
        ["recording started", "recording confirmed", "sending audio to transcription"]
    );
}

#[test]
fn test_reference_scenario_through_detector() {
    let gate = ScriptedGate::new((1..=75).map(|id| (6..=60).contains(&id)));
    let recognizer = ScriptedRecognizer::new((1..=75).map(|id| match id {
        6..=8 => partial("ok robot"),
        20 => final_text("ok robot"),
        _ => None,
    }));
    let mut detector = WakeWordDetector::new(gate, recognizer, machine(limits(3, 15, 500, 100)));

    let drained: Vec<Vec<u8>> = (1..=75).filter_map(|id| detector.process(frame(id))).collect();

    assert_eq!(drained.len(), 1);
    assert_eq!(frame_ids(&drained[0]).first(), Some(&8));
    assert_eq!(frame_ids(&drained[0]).last(), Some(&75));
    assert_eq!(detector.state(), TriggerState::Idle);
}

#[test]
fn test_recognizer_sees_every_frame() {
    let recognizer = ScriptedRecognizer::default();
    let calls = recognizer.calls();
    let mut detector = WakeWordDetector::new(
        ScriptedGate::new([true, false, false, true]),
        recognizer,
        machine(limits(3, 15, 500, 100)),
    );
    for id in 0..10 {
        detector.process(frame(id));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 10);
}

#[test]
fn test_guard_overflow_never_hands_off() {
    let recorder = Recorder::default();
    let mut m = machine(limits(2, 15, 500, 10)).with_observer(recorder.clone());

    m.step(frame(1), true, partial("ok robot"));
    m.step(frame(2), true, partial("ok robot"));
    assert_eq!(m.state(), TriggerState::Armed);

    for id in 3..=11 {
        assert!(m.step(frame(id), true, partial("")).is_none());
        assert_eq!(m.state(), TriggerState::Armed);
    }

    // Eleventh buffered frame crosses the ten-frame guard
    assert!(m.step(frame(12), true, None).is_none());
    assert_eq!(m.state(), TriggerState::Idle);
    assert_eq!(m.buffered_bytes(), 0);

    for id in 13..=60 {
        assert!(m.step(frame(id), true, None).is_none());
    }

    assert_eq!(
        recorder.events(),
        vec![
            TriggerEvent::Armed,
            TriggerEvent::Discarded {
                bytes: 11 * FRAME_BYTES,
                reason: DiscardReason::GuardOverflow,
            },
        ]
    );
}

#[test]
fn test_confirmed_overflow_force_drains() {
    let mut m = machine(limits(3, 15, 10, 5));
    m.step(frame(1), true, final_text("okay robot"));

    let mut drained = None;
    for id in 2..=30 {
        if let Some(pcm) = m.step(frame(id), true, None) {
            drained = Some((id, pcm));
            break;
        }
    }

    let (at, pcm) = drained.expect("confirmed cap forces a drain");
    assert_eq!(at, 11);
    assert_eq!(frame_ids(&pcm), (1..=11).collect::<Vec<_>>());
    assert_eq!(m.state(), TriggerState::Idle);
}

#[test]
fn test_matching_is_accent_and_case_insensitive() {
    assert!(WakeMatcher::new(["ok robot"]).matches("OK RÓBOT extra words"));

    let mut m = machine(limits(3, 15, 500, 100));
    m.step(frame(1), true, final_text("OK RÓBOT extra words"));
    assert_eq!(m.state(), TriggerState::Confirmed);
}

#[test]
fn test_silent_frames_ignore_hypotheses() {
    let mut m = machine(limits(2, 15, 500, 100));
    for _ in 0..10 {
        m.step(frame(1), false, partial("ok robot"));
        m.step(frame(1), false, final_text("ok robot"));
    }
    assert_eq!(m.state(), TriggerState::Idle);
    assert_eq!(m.partial_hits(), -15);
}

#[test]
fn test_empty_partial_keeps_hits() {
    let mut m = machine(limits(3, 15, 500, 100));
    m.step(frame(1), true, partial("ok robot"));
    m.step(frame(1), true, partial(""));
    m.step(frame(1), true, None);
    assert_eq!(m.partial_hits(), 1);
}

#[test]
fn test_silence_blip_only_decrements_matching_run() {
    let mut m = machine(limits(3, 15, 500, 100));
    m.step(frame(1), true, partial("ok robot"));
    m.step(frame(2), true, partial("ok robot"));
    m.step(frame(3), false, None);
    assert_eq!(m.partial_hits(), 1);

    m.step(frame(4), true, partial("ok robot"));
    assert_eq!(m.state(), TriggerState::Idle);
    m.step(frame(5), true, partial("ok robot"));
    assert_eq!(m.state(), TriggerState::Armed);
    assert_eq!(m.partial_hits(), 0);
    assert_eq!(m.buffered_frames(), 1);
}

#[test]
fn test_match_limit_while_capturing_keeps_state() {
    let recorder = Recorder::default();
    let mut m = machine(limits(3, 15, 500, 100)).with_observer(recorder.clone());
    for _ in 0..3 {
        m.step(frame(1), true, partial("ok robot"));
    }
    assert_eq!(m.state(), TriggerState::Armed);
    assert_eq!(m.buffered_frames(), 1);

    for n in 1..=3 {
        m.step(frame(2), true, partial("ok robot"));
        assert_eq!(m.state(), TriggerState::Armed);
        assert_eq!(m.buffered_frames(), 1 + n);
    }
    assert_eq!(m.partial_hits(), 0);
    assert_eq!(count_armed(&recorder), 1);

    m.step(frame(3), true, final_text("ok robot"));
    assert_eq!(m.state(), TriggerState::Confirmed);
    assert_eq!(m.buffered_frames(), 5);

    for n in 1..=3 {
        m.step(frame(4), true, partial("ok robot"));
        assert_eq!(m.state(), TriggerState::Confirmed);
        assert_eq!(m.buffered_frames(), 5 + n);
    }
    assert_eq!(m.partial_hits(), 0);
    assert_eq!(count_armed(&recorder), 1);
}

#[test]
fn test_buffer_size_accounts_for_every_byte() {
    let recorder = Recorder::default();
    let mut m = machine(limits(2, 4, 40, 12)).with_observer(recorder.clone());
    let mut seed = 0x2545_f491_u32;
    let mut appended_frames = 0;
    let mut handed_off = 0;

    for step in 0..2000 {
        seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
        let roll = (seed >> 16) % 100;
        let speech = roll >= 30;
        let hypothesis = match roll {
            30..=59 => partial("ok robot"),
            60..=64 => final_text("ok robot"),
            65..=69 => final_text("something else"),
            70..=79 => partial("noise"),
            _ => None,
        };

        let was_idle = m.state() == TriggerState::Idle;
        let armed_before = count_armed(&recorder);
        let out = m.step(frame(1), speech, hypothesis);

        if !was_idle {
            appended_frames += 1;
        }
        appended_frames += count_armed(&recorder) - armed_before;

        if let Some(pcm) = &out {
            assert_eq!(m.state(), TriggerState::Idle, "step {step}");
            assert_eq!(m.buffered_bytes(), 0, "step {step}");
            handed_off += pcm.len();
        }

        let discarded: usize = recorder
            .events()
            .iter()
            .map(|e| match e {
                TriggerEvent::Discarded { bytes, .. } => *bytes,
                _ => 0,
            })
            .sum();

        assert_eq!(
            appended_frames * FRAME_BYTES,
            handed_off + discarded + m.buffered_bytes(),
            "step {step}"
        );
        assert_eq!(m.buffered_bytes(), m.buffered_frames() * FRAME_BYTES);
        assert!(m.partial_hits() >= -4 && m.partial_hits() < 2, "step {step}");
        if m.state() == TriggerState::Idle {
            assert_eq!(m.buffered_bytes(), 0, "step {step}");
        }
    }

    assert!(handed_off > 0, "script never completed a capture");
}

fn count_armed(recorder: &Recorder) -> usize {
    recorder
        .events()
        .iter()
        .filter(|e| matches!(e, TriggerEvent::Armed))
        .count()
}

#[test]
fn test_idle_to_confirmed_announces_both_transitions() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut m = machine(limits(3, 15, 500, 100));
    m.add_observer(move |event: &TriggerEvent| {
        sink.lock().unwrap().push(event.to_string());
    });

    m.step(frame(1), true, final_text("hey, ok robot"));
    assert_eq!(
        *seen.lock().unwrap(),
        ["recording started", "recording confirmed"]
    );
}

#[test]
fn test_instances_are_independent() {
    let mut a = machine(limits(1, 15, 500, 100));
    let b = machine(limits(1, 15, 500, 100));

    a.step(frame(1), true, partial("ok robot"));
    assert_eq!(a.state(), TriggerState::Armed);
    assert_eq!(b.state(), TriggerState::Idle);
    assert_eq!(b.buffered_bytes(), 0);
}

#[test]
fn test_buffer_drain_is_exactly_once() {
    let buffer = Arc::new(UtteranceBuffer::new());
    for id in 0..50 {
        buffer.append(frame(id));
    }

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let buffer = Arc::clone(&buffer);
            std::thread::spawn(move || buffer.drain())
        })
        .collect();
    let drained: Vec<Vec<u8>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let non_empty: Vec<_> = drained.iter().filter(|d| !d.is_empty()).collect();
    assert_eq!(non_empty.len(), 1);
    assert_eq!(frame_ids(non_empty[0]), (0..50).collect::<Vec<_>>());
    assert!(buffer.is_empty());
    assert!(buffer.drain().is_empty());
    assert_eq!(buffer.clear(), 0);
}

#[test]
fn test_rejects_invalid_construction() {
    assert!(TriggerStateMachine::new(WakeMatcher::new(["ok robot"]), limits(0, 15, 500, 100)).is_err());
    assert!(TriggerStateMachine::new(WakeMatcher::new(["  "]), limits(3, 15, 500, 100)).is_err());
}
