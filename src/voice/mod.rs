//! Voice processing module
//!
//! The frame path (capture, gate, recognizer, trigger state machine,
//! utterance buffer) runs synchronously at the frame rate. STT and TTS are
//! downstream collaborators fed from drained utterances (see `daemon.rs`).

mod buffer;
mod capture;
mod frame;
mod gate;
mod matcher;
mod notify;
mod playback;
mod recognizer;
mod replay;
mod stt;
mod tts;
mod wake_word;

pub use buffer::UtteranceBuffer;
pub use capture::{AudioCapture, pcm16_to_wav};
pub use frame::{
    BYTES_PER_SAMPLE, Frame, FrameFormat, FrameSource, SUPPORTED_FRAME_MS, SUPPORTED_SAMPLE_RATES,
    f32_to_i16, frames_from_samples,
};
pub use gate::{
    Aggressiveness, EarshotGate, EnergyGate, VadBackend, VoiceActivityGate, build_gate,
    calculate_energy,
};
pub use matcher::{WakeMatcher, normalize};
pub use notify::{
    ChannelObserver, DiscardReason, DrainReason, LogObserver, TriggerEvent, TriggerObserver,
};
pub use playback::AudioPlayback;
#[cfg(feature = "vosk")]
pub use recognizer::VoskRecognizer;
pub use recognizer::{GrammarRecognizer, Hypothesis};
pub use replay::WavFrameSource;
pub use stt::{SpeechToText, SttProvider, Transcriber};
pub use tts::{Synthesizer, TextToSpeech, TtsProvider};
pub use wake_word::{TriggerLimits, TriggerState, TriggerStateMachine, WakeWordDetector};
