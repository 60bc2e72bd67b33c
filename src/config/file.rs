//! TOML configuration file loading
//!
//! Supports `~/.config/harken/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::intent::IntentRule;
use crate::voice::{SttProvider, TtsProvider, VadBackend};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct HarkenConfigFile {
    /// Wake word detection
    #[serde(default)]
    pub wake: WakeFileConfig,

    /// Transcription and reply voice
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// Ordered intent rules
    #[serde(default)]
    pub intents: Vec<IntentRule>,

    /// Reply spoken when no intent matches
    pub fallback_reply: Option<String>,
}

/// Wake word detection configuration
#[derive(Debug, Default, Deserialize)]
pub struct WakeFileConfig {
    /// Canonical activation phrase (e.g. "ok robot")
    pub activation_phrase: Option<String>,

    /// Accepted spellings of the phrase
    pub variants: Option<Vec<String>>,

    /// Capture sample rate in Hz
    pub sample_rate: Option<u32>,

    /// Frame duration in milliseconds (10, 20 or 30)
    pub frame_ms: Option<u32>,

    /// Maximum confirmed capture length in seconds
    pub listen_seconds: Option<f64>,

    /// Consecutive matching partials needed to arm
    pub match_limit: Option<u32>,

    /// Consecutive silent frames that end a capture
    pub silence_limit: Option<u32>,

    /// Maximum unconfirmed capture length in milliseconds
    pub unconfirmed_guard_ms: Option<u64>,

    /// Voice activity aggressiveness (0-3)
    pub vad_aggressiveness: Option<u8>,

    /// Voice activity backend ("earshot" or "energy")
    pub vad_backend: Option<VadBackend>,

    /// Vosk model directory
    pub model_path: Option<String>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// STT provider ("whisper" or "deepgram")
    pub stt_provider: Option<SttProvider>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// Spoken language hint (e.g. "es")
    pub language: Option<String>,

    /// TTS provider ("openai" or "elevenlabs")
    pub tts_provider: Option<TtsProvider>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice identifier (e.g. "alloy")
    pub tts_voice: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f32>,

    /// Speak routed replies through the speaker
    pub speak_replies: Option<bool>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub deepgram: Option<String>,
    pub elevenlabs: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `HarkenConfigFile::default()` if the file doesn't exist or can't be parsed.
#[must_use]
pub fn load_config_file() -> HarkenConfigFile {
    config_file_path().map_or_else(HarkenConfigFile::default, |path| load_config_from(&path))
}

/// Load a TOML config file from an explicit path
///
/// Missing or unparsable files fall back to defaults with a warning.
#[must_use]
pub fn load_config_from(path: &Path) -> HarkenConfigFile {
    if !path.exists() {
        return HarkenConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                HarkenConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            HarkenConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/harken/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("harken").join("config.toml"))
}
