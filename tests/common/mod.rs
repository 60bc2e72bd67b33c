//! Shared test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use harken::voice::{
    BYTES_PER_SAMPLE, Frame, GrammarRecognizer, Hypothesis, TriggerEvent, TriggerLimits,
    TriggerObserver, TriggerStateMachine, VoiceActivityGate, WakeMatcher,
};

/// Samples per frame at 16 kHz / 10 ms
pub const FRAME_SAMPLES: usize = 160;

/// Bytes per frame at 16 kHz / 10 ms
pub const FRAME_BYTES: usize = FRAME_SAMPLES * BYTES_PER_SAMPLE;

/// A frame whose samples all carry `id`, so drained audio can be traced back
pub fn frame(id: i16) -> Frame {
    Frame::new(vec![id; FRAME_SAMPLES])
}

/// Frame ids in drained PCM16 bytes, in order
pub fn frame_ids(pcm: &[u8]) -> Vec<i16> {
    assert_eq!(pcm.len() % FRAME_BYTES, 0, "drained bytes are not whole frames");
    pcm.chunks(FRAME_BYTES)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect()
}

/// Limits with the byte caps given in frames
pub fn limits(match_limit: u32, silence_limit: u32, confirmed_frames: usize, guard_frames: usize) -> TriggerLimits {
    TriggerLimits {
        match_limit,
        silence_limit,
        max_confirmed_bytes: confirmed_frames * FRAME_BYTES,
        max_unconfirmed_bytes: guard_frames * FRAME_BYTES,
    }
}

/// A state machine listening for "ok robot"
pub fn machine(limits: TriggerLimits) -> TriggerStateMachine {
    TriggerStateMachine::new(WakeMatcher::new(["ok robot", "okay robot"]), limits)
        .expect("valid limits")
}

/// Records every trigger event
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<TriggerEvent>>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<TriggerEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl TriggerObserver for Recorder {
    fn notify(&self, event: &TriggerEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Recognizer replaying a fixed hypothesis script, then staying quiet
#[derive(Default)]
pub struct ScriptedRecognizer {
    script: VecDeque<Option<Hypothesis>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedRecognizer {
    pub fn new(script: impl IntoIterator<Item = Option<Hypothesis>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            calls: Arc::default(),
        }
    }

    /// Shared count of frames fed to the recognizer
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl GrammarRecognizer for ScriptedRecognizer {
    fn accept(&mut self, _frame: &Frame) -> Option<Hypothesis> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script.pop_front().flatten()
    }
}

/// Gate replaying a fixed speech/silence script, then reporting silence
#[derive(Default)]
pub struct ScriptedGate {
    script: VecDeque<bool>,
}

impl ScriptedGate {
    pub fn new(script: impl IntoIterator<Item = bool>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }
}

impl VoiceActivityGate for ScriptedGate {
    fn is_speech(&mut self, _frame: &Frame) -> bool {
        self.script.pop_front().unwrap_or(false)
    }
}
