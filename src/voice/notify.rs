//! Observational notifications for trigger state changes
//!
//! Observers see events after the state machine has already committed the
//! transition; nothing they do can alter it.

use std::fmt;

use tokio::sync::mpsc::UnboundedSender;

/// Why a capture was discarded instead of handed off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Sustained silence ended an armed capture that was never confirmed
    Unconfirmed,
    /// An armed capture outgrew the unconfirmed guard cap
    GuardOverflow,
}

/// How a confirmed capture ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainReason {
    /// Sustained silence after the utterance
    Silence,
    /// The confirmed capacity was exceeded
    Overflow,
}

/// A trigger lifecycle event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerEvent {
    /// A candidate utterance began buffering
    Armed,
    /// A final hypothesis matched the wake grammar
    Confirmed {
        /// Matched hypothesis text
        text: String,
    },
    /// A captured utterance was handed downstream
    Drained {
        /// Bytes handed off
        bytes: usize,
        /// What ended the capture
        reason: DrainReason,
    },
    /// A capture was thrown away
    Discarded {
        /// Bytes dropped
        bytes: usize,
        /// Why it was dropped
        reason: DiscardReason,
    },
}

impl TriggerEvent {
    /// Short human-readable description
    #[must_use]
    pub const fn describe(&self) -> &'static str {
        match self {
            Self::Armed => "recording started",
            Self::Confirmed { .. } => "recording confirmed",
            Self::Drained { .. } => "sending audio to transcription",
            Self::Discarded {
                reason: DiscardReason::Unconfirmed,
                ..
            } => "detection not confirmed, buffer cleared",
            Self::Discarded {
                reason: DiscardReason::GuardOverflow,
                ..
            } => "unconfirmed capture too long, buffer cleared",
        }
    }
}

impl fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Receives trigger events
///
/// Called synchronously on the frame path, so implementations must return
/// promptly and never block.
pub trait TriggerObserver: Send {
    /// Handle an event
    fn notify(&self, event: &TriggerEvent);
}

impl<F> TriggerObserver for F
where
    F: Fn(&TriggerEvent) + Send,
{
    fn notify(&self, event: &TriggerEvent) {
        self(event);
    }
}

/// Forwards events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl TriggerObserver for LogObserver {
    fn notify(&self, event: &TriggerEvent) {
        match event {
            TriggerEvent::Armed => tracing::info!("{event}"),
            TriggerEvent::Confirmed { text } => tracing::info!(text, "{event}"),
            TriggerEvent::Drained { bytes, reason } => {
                tracing::info!(bytes, reason = ?reason, "{event}");
            }
            TriggerEvent::Discarded { bytes, reason } => {
                tracing::warn!(bytes, reason = ?reason, "{event}");
            }
        }
    }
}

/// Forwards events onto an unbounded channel
///
/// Sending never blocks; events are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: UnboundedSender<TriggerEvent>,
}

impl ChannelObserver {
    /// Wrap a channel sender
    #[must_use]
    pub const fn new(tx: UnboundedSender<TriggerEvent>) -> Self {
        Self { tx }
    }
}

impl TriggerObserver for ChannelObserver {
    fn notify(&self, event: &TriggerEvent) {
        if self.tx.send(event.clone()).is_err() {
            tracing::trace!("trigger event receiver dropped");
        }
    }
}
