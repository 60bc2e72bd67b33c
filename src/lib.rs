//! Harken - wake word front end for robot voice commands
//!
//! This library provides:
//! - Frame-synchronous wake word detection and utterance capture
//! - Speech-to-text, intent routing and text-to-speech collaborators
//! - The daemon that wires them to a microphone and a speaker
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  frame thread (10 ms frames)                         │
//! │  FrameSource → VoiceActivityGate ┐                   │
//! │              → GrammarRecognizer ┴→ TriggerStateMachine
//! │                                     └→ UtteranceBuffer│
//! └────────────────────┬─────────────────────────────────┘
//!                      │ drained PCM16 (bounded channel)
//! ┌────────────────────▼─────────────────────────────────┐
//! │  async side                                          │
//! │  Transcriber → IntentRouter → Synthesizer → speaker  │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod daemon;
pub mod error;
pub mod intent;
pub mod voice;

pub use config::Config;
pub use daemon::{Daemon, Reply, VoicePipeline};
pub use error::{Error, Result};
pub use intent::{IntentRouter, IntentRule, Route, RuleRouter};
