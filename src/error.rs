//! Error types for harken

use thiserror::Error;

/// Result type alias for harken operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in harken
///
/// None of these ever escape the per-frame path; they surface at startup
/// (configuration, model loading, device setup) or from the downstream
/// collaborators that consume a captured utterance.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Voice processing error
    #[error("voice error: {0}")]
    Voice(String),

    /// Audio device or decoding error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Wake word recognizer error
    #[error("wake word error: {0}")]
    WakeWord(String),

    /// Intent routing error
    #[error("intent error: {0}")]
    Intent(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// WAV encoding/decoding error
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),
}
