//! Wake word trigger state machine
//!
//! Runs synchronously once per frame on the capture path. Each frame is
//! classified by a [`VoiceActivityGate`], fed to a [`GrammarRecognizer`], and
//! the pair of results drives a three-state lifecycle:
//!
//! ```text
//!            matching partials x match_limit
//!   Idle ─────────────────────────────────────▶ Armed
//!    │  ▲                                          │
//!    │  │ silence_limit silent frames (discard)    │ matching final
//!    │  │ or guard overflow (discard)              ▼
//!    │  └──────────────────────────────────── Confirmed
//!    │          silence_limit silent frames         ▲
//!    │          or capacity overflow (drain)        │
//!    └──────────────────────────────────────────────┘
//!                     matching final
//! ```
//!
//! While armed or confirmed, every frame is buffered before any trigger
//! bookkeeping so no audio belonging to the utterance is lost. A confirmed
//! capture is handed off as one contiguous PCM16 byte run; an unconfirmed one
//! is never handed off.

use super::buffer::UtteranceBuffer;
use super::frame::Frame;
use super::gate::VoiceActivityGate;
use super::matcher::WakeMatcher;
use super::notify::{DiscardReason, DrainReason, TriggerEvent, TriggerObserver};
use super::recognizer::{GrammarRecognizer, Hypothesis};
use crate::{Error, Result};

/// Lifecycle of a single capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    /// No utterance in progress; the buffer is empty
    Idle,
    /// A candidate utterance is buffering but not yet confirmed
    Armed,
    /// A final hypothesis matched; buffering until an end condition
    Confirmed,
}

/// Debounce thresholds and capacity caps, all in frames or bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerLimits {
    /// Consecutive matching partials needed to arm
    pub match_limit: u32,
    /// Consecutive silent frames that end a capture
    pub silence_limit: u32,
    /// Byte cap for a confirmed capture; exceeding it force-drains
    pub max_confirmed_bytes: usize,
    /// Byte cap for an armed, unconfirmed capture; exceeding it discards
    pub max_unconfirmed_bytes: usize,
}

impl TriggerLimits {
    /// Validate the limits
    ///
    /// # Errors
    ///
    /// Returns error if a limit is zero
    pub fn validate(&self) -> Result<()> {
        if self.match_limit == 0 {
            return Err(Error::Config("match_limit must be at least 1".to_string()));
        }
        if self.silence_limit == 0 {
            return Err(Error::Config("silence_limit must be at least 1".to_string()));
        }
        if self.max_confirmed_bytes == 0 || self.max_unconfirmed_bytes == 0 {
            return Err(Error::Config("capture caps must be non-zero".to_string()));
        }
        Ok(())
    }

    fn match_hits(&self) -> i64 {
        i64::from(self.match_limit)
    }

    fn silence_floor(&self) -> i64 {
        -i64::from(self.silence_limit)
    }
}

/// Decides, frame by frame, where a wake-triggered utterance begins and ends
///
/// Owns the [`UtteranceBuffer`] exclusively. Never fails: every input leads
/// to a defined state, and the only output is an optional drained utterance.
pub struct TriggerStateMachine {
    matcher: WakeMatcher,
    limits: TriggerLimits,
    state: TriggerState,
    /// Positive: run of matching partials. Negative: run of silent frames.
    /// Bounded in `[-silence_limit, match_limit]`.
    partial_hits: i64,
    buffer: UtteranceBuffer,
    observers: Vec<Box<dyn TriggerObserver>>,
}

impl TriggerStateMachine {
    /// Create an idle state machine
    ///
    /// # Errors
    ///
    /// Returns error if the limits are invalid or the matcher has no variants
    pub fn new(matcher: WakeMatcher, limits: TriggerLimits) -> Result<Self> {
        limits.validate()?;
        if matcher.variants().is_empty() {
            return Err(Error::Config(
                "at least one wake phrase variant is required".to_string(),
            ));
        }

        tracing::debug!(
            match_limit = limits.match_limit,
            silence_limit = limits.silence_limit,
            max_confirmed_bytes = limits.max_confirmed_bytes,
            max_unconfirmed_bytes = limits.max_unconfirmed_bytes,
            "trigger state machine initialized"
        );

        Ok(Self {
            matcher,
            limits,
            state: TriggerState::Idle,
            partial_hits: 0,
            buffer: UtteranceBuffer::new(),
            observers: Vec::new(),
        })
    }

    /// Register an observer
    #[must_use]
    pub fn with_observer(mut self, observer: impl TriggerObserver + 'static) -> Self {
        self.add_observer(observer);
        self
    }

    /// Register an observer
    pub fn add_observer(&mut self, observer: impl TriggerObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Advance by one frame
    ///
    /// `is_speech` is the gate's verdict for `frame` and `hypothesis` is what
    /// the recognizer emitted for it. Returns the captured utterance when this
    /// frame ends a confirmed capture.
    pub fn step(
        &mut self,
        frame: Frame,
        is_speech: bool,
        hypothesis: Option<Hypothesis>,
    ) -> Option<Vec<u8>> {
        // Capture before bookkeeping
        if self.state != TriggerState::Idle {
            let size = self.buffer.append(frame.clone());
            match self.state {
                TriggerState::Confirmed if size > self.limits.max_confirmed_bytes => {
                    tracing::debug!(size, "confirmed capture reached capacity");
                    return self.finish(DrainReason::Overflow);
                }
                TriggerState::Armed if size > self.limits.max_unconfirmed_bytes => {
                    tracing::debug!(size, "unconfirmed capture exceeded guard");
                    self.discard(DiscardReason::GuardOverflow);
                    return None;
                }
                _ => {}
            }
        }

        if !is_speech {
            return self.on_silence();
        }

        // Speech clears silence debt
        self.partial_hits = self.partial_hits.max(0);

        match hypothesis {
            Some(Hypothesis::Final(text)) => self.on_final(frame, &text),
            Some(Hypothesis::Partial(text)) if !text.is_empty() => self.on_partial(frame, &text),
            Some(Hypothesis::Partial(_)) | None => {}
        }

        None
    }

    fn on_silence(&mut self) -> Option<Vec<u8>> {
        let floor = self.limits.silence_floor();
        self.partial_hits = (self.partial_hits - 1).max(floor);

        if self.state == TriggerState::Idle || self.partial_hits > floor {
            return None;
        }

        self.partial_hits = 0;
        if self.state == TriggerState::Confirmed && !self.buffer.is_empty() {
            return self.finish(DrainReason::Silence);
        }

        self.discard(DiscardReason::Unconfirmed);
        None
    }

    fn on_final(&mut self, frame: Frame, text: &str) {
        self.partial_hits = 0;

        if !self.matcher.matches(text) {
            tracing::trace!(text, "final hypothesis did not match");
            return;
        }

        tracing::info!(text, "[FULL] wake word");
        if self.state == TriggerState::Idle {
            self.arm(frame);
        }
        if self.state == TriggerState::Armed {
            self.state = TriggerState::Confirmed;
            tracing::debug!("trigger confirmed");
            self.emit(&TriggerEvent::Confirmed {
                text: text.to_string(),
            });
        }
    }

    fn on_partial(&mut self, frame: Frame, text: &str) {
        if !self.matcher.matches(text) {
            self.partial_hits = 0;
            return;
        }

        self.partial_hits += 1;
        tracing::trace!(text, hits = self.partial_hits, "matching partial");

        if self.partial_hits >= self.limits.match_hits() {
            self.partial_hits = 0;
            if self.state == TriggerState::Idle {
                tracing::info!(text, "[PARTIAL] wake word");
                self.arm(frame);
            }
        }
    }

    /// Enter `Armed` from `Idle`, buffering the frame that triggered it
    fn arm(&mut self, frame: Frame) {
        self.buffer.append(frame);
        self.state = TriggerState::Armed;
        tracing::debug!("trigger armed");
        self.emit(&TriggerEvent::Armed);
    }

    /// Hand off the confirmed capture and return to `Idle`
    fn finish(&mut self, reason: DrainReason) -> Option<Vec<u8>> {
        let frames = self.buffer.frame_count();
        let bytes = self.buffer.drain();
        self.state = TriggerState::Idle;
        self.partial_hits = 0;

        tracing::debug!(frames, bytes = bytes.len(), reason = ?reason, "capture drained");
        self.emit(&TriggerEvent::Drained {
            bytes: bytes.len(),
            reason,
        });

        (!bytes.is_empty()).then_some(bytes)
    }

    /// Throw away the capture and return to `Idle`
    fn discard(&mut self, reason: DiscardReason) {
        let bytes = self.buffer.clear();
        self.state = TriggerState::Idle;
        self.partial_hits = 0;

        tracing::debug!(bytes, reason = ?reason, "capture discarded");
        self.emit(&TriggerEvent::Discarded { bytes, reason });
    }

    fn emit(&self, event: &TriggerEvent) {
        for observer in &self.observers {
            observer.notify(event);
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> TriggerState {
        self.state
    }

    /// Current debounce counter
    #[must_use]
    pub const fn partial_hits(&self) -> i64 {
        self.partial_hits
    }

    /// Bytes currently buffered
    #[must_use]
    pub fn buffered_bytes(&self) -> usize {
        self.buffer.size()
    }

    /// Frames currently buffered
    #[must_use]
    pub fn buffered_frames(&self) -> usize {
        self.buffer.frame_count()
    }

    /// Configured limits
    #[must_use]
    pub const fn limits(&self) -> &TriggerLimits {
        &self.limits
    }

    /// Wake phrase matcher
    #[must_use]
    pub const fn matcher(&self) -> &WakeMatcher {
        &self.matcher
    }
}

/// Wires a gate and a recognizer into a [`TriggerStateMachine`]
///
/// Every frame goes through the gate and the recognizer exactly once, in
/// that order, so the recognizer's acoustic context stays aligned with the
/// audio even across silence and capacity cut-offs.
pub struct WakeWordDetector<G = Box<dyn VoiceActivityGate>, R = Box<dyn GrammarRecognizer>> {
    gate: G,
    recognizer: R,
    machine: TriggerStateMachine,
}

impl<G: VoiceActivityGate, R: GrammarRecognizer> WakeWordDetector<G, R> {
    /// Assemble a detector
    pub const fn new(gate: G, recognizer: R, machine: TriggerStateMachine) -> Self {
        Self {
            gate,
            recognizer,
            machine,
        }
    }

    /// Process one frame, returning a captured utterance when one completes
    pub fn process(&mut self, frame: Frame) -> Option<Vec<u8>> {
        let is_speech = self.gate.is_speech(&frame);
        let hypothesis = self.recognizer.accept(&frame);
        self.machine.step(frame, is_speech, hypothesis)
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> TriggerState {
        self.machine.state()
    }

    /// The underlying state machine
    #[must_use]
    pub const fn machine(&self) -> &TriggerStateMachine {
        &self.machine
    }

    /// Register an observer on the underlying state machine
    pub fn add_observer(&mut self, observer: impl TriggerObserver + 'static) {
        self.machine.add_observer(observer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME_SAMPLES: usize = 160;

    fn limits(match_limit: u32, silence_limit: u32) -> TriggerLimits {
        TriggerLimits {
            match_limit,
            silence_limit,
            max_confirmed_bytes: 1000 * FRAME_SAMPLES * 2,
            max_unconfirmed_bytes: 100 * FRAME_SAMPLES * 2,
        }
    }

    fn machine(match_limit: u32, silence_limit: u32) -> TriggerStateMachine {
        TriggerStateMachine::new(
            WakeMatcher::new(["ok robot"]),
            limits(match_limit, silence_limit),
        )
        .unwrap()
    }

    fn frame() -> Frame {
        Frame::new(vec![100; FRAME_SAMPLES])
    }

    fn partial(text: &str) -> Option<Hypothesis> {
        Some(Hypothesis::partial(text))
    }

    #[test]
    fn test_rejects_zero_limits() {
        let matcher = WakeMatcher::new(["ok robot"]);
        assert!(TriggerStateMachine::new(matcher.clone(), limits(0, 5)).is_err());
        assert!(TriggerStateMachine::new(matcher, limits(5, 0)).is_err());
        assert!(TriggerStateMachine::new(WakeMatcher::new([""]), limits(1, 1)).is_err());
    }

    #[test]
    fn test_arms_on_nth_matching_partial() {
        let mut m = machine(3, 5);
        m.step(frame(), true, partial("ok robot"));
        m.step(frame(), true, partial("ok robot"));
        assert_eq!(m.state(), TriggerState::Idle);
        assert_eq!(m.partial_hits(), 2);

        m.step(frame(), true, partial("ok robot"));
        assert_eq!(m.state(), TriggerState::Armed);
        assert_eq!(m.partial_hits(), 0);
        assert_eq!(m.buffered_frames(), 1);
    }

    #[test]
    fn test_non_matching_partial_resets_hits() {
        let mut m = machine(3, 5);
        m.step(frame(), true, partial("ok robot"));
        m.step(frame(), true, partial("ok robot"));
        m.step(frame(), true, partial("hello"));
        assert_eq!(m.partial_hits(), 0);
        m.step(frame(), true, partial("ok robot"));
        assert_eq!(m.state(), TriggerState::Idle);
    }

    #[test]
    fn test_silence_counter_is_floored() {
        let mut m = machine(3, 4);
        for _ in 0..10 {
            m.step(frame(), false, None);
        }
        assert_eq!(m.partial_hits(), -4);
        assert_eq!(m.state(), TriggerState::Idle);
        assert_eq!(m.buffered_bytes(), 0);
    }

    #[test]
    fn test_silence_decrements_positive_hits() {
        let mut m = machine(3, 4);
        m.step(frame(), true, partial("ok robot"));
        m.step(frame(), true, partial("ok robot"));
        m.step(frame(), false, None);
        assert_eq!(m.partial_hits(), 1);
        m.step(frame(), false, None);
        m.step(frame(), false, None);
        assert_eq!(m.partial_hits(), -1);
    }

    #[test]
    fn test_final_match_from_idle_confirms_and_buffers_frame() {
        let mut m = machine(3, 4);
        m.step(frame(), true, Some(Hypothesis::final_text("ok robot")));
        assert_eq!(m.state(), TriggerState::Confirmed);
        assert_eq!(m.buffered_frames(), 1);
    }

    #[test]
    fn test_final_after_arming_does_not_duplicate_frame() {
        let mut m = machine(1, 4);
        m.step(frame(), true, partial("ok robot"));
        assert_eq!(m.buffered_frames(), 1);
        m.step(frame(), true, Some(Hypothesis::final_text("ok robot")));
        assert_eq!(m.state(), TriggerState::Confirmed);
        assert_eq!(m.buffered_frames(), 2);
    }

    #[test]
    fn test_confirmed_overflow_force_drains() {
        let mut m = TriggerStateMachine::new(
            WakeMatcher::new(["ok robot"]),
            TriggerLimits {
                match_limit: 1,
                silence_limit: 50,
                max_confirmed_bytes: 4 * FRAME_SAMPLES * 2,
                max_unconfirmed_bytes: 4 * FRAME_SAMPLES * 2,
            },
        )
        .unwrap();

        m.step(frame(), true, Some(Hypothesis::final_text("ok robot")));
        for _ in 0..3 {
            assert!(m.step(frame(), true, None).is_none());
        }
        let drained = m.step(frame(), true, None).unwrap();
        assert_eq!(drained.len(), 5 * FRAME_SAMPLES * 2);
        assert_eq!(m.state(), TriggerState::Idle);
        assert_eq!(m.buffered_bytes(), 0);
    }
}
