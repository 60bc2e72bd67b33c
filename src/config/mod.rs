//! Configuration management for harken

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use crate::intent::IntentRule;
use crate::voice::{
    Aggressiveness, FrameFormat, SttProvider, TriggerLimits, TtsProvider, VadBackend, WakeMatcher,
};
use crate::{Error, Result};

const DEFAULT_PHRASE: &str = "ok robot";
const DEFAULT_VARIANTS: [&str; 3] = ["ok robot", "okay robot", "hey robot"];
const DEFAULT_FALLBACK_REPLY: &str = "Sorry, I didn't catch that.";

/// Harken configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Wake word detection configuration
    pub wake: WakeConfig,

    /// Transcription and reply voice configuration
    pub voice: VoiceConfig,

    /// API keys
    pub api_keys: ApiKeys,

    /// Ordered intent rules
    pub intents: Vec<IntentRule>,

    /// Reply spoken when no intent matches
    pub fallback_reply: String,
}

/// Wake word detection configuration
#[derive(Debug, Clone)]
pub struct WakeConfig {
    /// Canonical activation phrase
    pub activation_phrase: String,

    /// Accepted spellings of the phrase
    pub variants: Vec<String>,

    /// Capture sample rate in Hz
    pub sample_rate: u32,

    /// Frame duration in milliseconds
    pub frame_ms: u32,

    /// Maximum confirmed capture length in seconds
    pub listen_seconds: f64,

    /// Consecutive matching partials needed to arm
    pub match_limit: u32,

    /// Consecutive silent frames that end a capture
    pub silence_limit: u32,

    /// Maximum unconfirmed capture length in milliseconds
    pub unconfirmed_guard_ms: u64,

    /// Voice activity aggressiveness (0-3)
    pub vad_aggressiveness: u8,

    /// Voice activity backend
    pub vad_backend: VadBackend,

    /// Vosk model directory
    pub model_path: Option<PathBuf>,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            activation_phrase: DEFAULT_PHRASE.to_string(),
            variants: DEFAULT_VARIANTS.iter().map(ToString::to_string).collect(),
            sample_rate: 16000,
            frame_ms: 10,
            listen_seconds: 5.0,
            match_limit: 15,
            silence_limit: 15,
            unconfirmed_guard_ms: 1000,
            vad_aggressiveness: 1,
            vad_backend: VadBackend::default(),
            model_path: None,
        }
    }
}

impl WakeConfig {
    /// Check every wake setting
    ///
    /// # Errors
    ///
    /// Returns error naming the first invalid setting
    pub fn validate(&self) -> Result<()> {
        if self.matcher().variants().is_empty() {
            return Err(Error::Config(
                "at least one wake phrase variant is required".to_string(),
            ));
        }
        if !self.listen_seconds.is_finite() || self.listen_seconds <= 0.0 {
            return Err(Error::Config(format!(
                "listen_seconds must be positive, got {}",
                self.listen_seconds
            )));
        }
        if self.unconfirmed_guard_ms == 0 {
            return Err(Error::Config(
                "unconfirmed_guard_ms must be positive".to_string(),
            ));
        }
        self.aggressiveness()?;
        self.trigger_limits()?.validate()
    }

    /// Matcher over the activation phrase and its variants
    #[must_use]
    pub fn matcher(&self) -> WakeMatcher {
        WakeMatcher::new(std::iter::once(&self.activation_phrase).chain(&self.variants))
    }

    /// Phrases for the recognizer grammar, as configured
    ///
    /// Trimmed and deduplicated but not normalized, so accented words stay in
    /// the model's vocabulary.
    #[must_use]
    pub fn grammar_phrases(&self) -> Vec<String> {
        let mut phrases: Vec<String> = Vec::new();
        for phrase in std::iter::once(&self.activation_phrase).chain(&self.variants) {
            let phrase = phrase.trim();
            if !phrase.is_empty() && !phrases.iter().any(|p| p == phrase) {
                phrases.push(phrase.to_string());
            }
        }
        phrases
    }

    /// Validated frame format
    ///
    /// # Errors
    ///
    /// Returns error if the sample rate or frame duration is unsupported
    pub fn frame_format(&self) -> Result<FrameFormat> {
        FrameFormat::new(self.sample_rate, self.frame_ms)
    }

    /// Debounce thresholds and byte caps derived from durations
    ///
    /// # Errors
    ///
    /// Returns error if the frame format is invalid
    pub fn trigger_limits(&self) -> Result<TriggerLimits> {
        let format = self.frame_format()?;
        let listen = Duration::try_from_secs_f64(self.listen_seconds)
            .map_err(|e| Error::Config(format!("invalid listen_seconds: {e}")))?;

        Ok(TriggerLimits {
            match_limit: self.match_limit,
            silence_limit: self.silence_limit,
            max_confirmed_bytes: format.bytes_for(listen),
            max_unconfirmed_bytes: format.bytes_for(Duration::from_millis(
                self.unconfirmed_guard_ms,
            )),
        })
    }

    /// Voice activity aggressiveness level
    ///
    /// # Errors
    ///
    /// Returns error if the level is above 3
    pub fn aggressiveness(&self) -> Result<Aggressiveness> {
        Aggressiveness::try_from(self.vad_aggressiveness)
    }
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// STT backend
    pub stt_provider: SttProvider,

    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: String,

    /// Spoken language hint passed to STT
    pub language: Option<String>,

    /// TTS backend
    pub tts_provider: TtsProvider,

    /// TTS model (e.g. "tts-1", "eleven_multilingual_v2")
    pub tts_model: String,

    /// TTS voice identifier
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f32,

    /// Speak routed replies through the speaker
    pub speak_replies: bool,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            stt_provider: SttProvider::default(),
            stt_model: "whisper-1".to_string(),
            language: None,
            tts_provider: TtsProvider::default(),
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            tts_speed: 1.0,
            speak_replies: true,
        }
    }
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (Whisper and TTS)
    pub openai: Option<SecretString>,

    /// `Deepgram` API key (optional STT)
    pub deepgram: Option<SecretString>,

    /// `ElevenLabs` API key (optional TTS)
    pub elevenlabs: Option<SecretString>,
}

impl ApiKeys {
    /// Key for the configured STT provider
    ///
    /// # Errors
    ///
    /// Returns error if the key is not configured
    pub fn for_stt(&self, provider: SttProvider) -> Result<SecretString> {
        let (key, name) = match provider {
            SttProvider::Whisper => (&self.openai, "OPENAI_API_KEY"),
            SttProvider::Deepgram => (&self.deepgram, "DEEPGRAM_API_KEY"),
        };
        key.clone()
            .ok_or_else(|| Error::Config(format!("{name} not set")))
    }

    /// Key for the configured TTS provider
    ///
    /// # Errors
    ///
    /// Returns error if the key is not configured
    pub fn for_tts(&self, provider: TtsProvider) -> Result<SecretString> {
        let (key, name) = match provider {
            TtsProvider::OpenAI => (&self.openai, "OPENAI_API_KEY"),
            TtsProvider::ElevenLabs => (&self.elevenlabs, "ELEVENLABS_API_KEY"),
        };
        key.clone()
            .ok_or_else(|| Error::Config(format!("{name} not set")))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wake: WakeConfig::default(),
            voice: VoiceConfig::default(),
            api_keys: ApiKeys::default(),
            intents: Vec::new(),
            fallback_reply: DEFAULT_FALLBACK_REPLY.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the standard file and the environment
    ///
    /// # Errors
    ///
    /// Returns error if the resulting wake configuration is invalid
    pub fn load() -> Result<Self> {
        Self::from_sources(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Load configuration from an explicit file and the environment
    ///
    /// # Errors
    ///
    /// Returns error if the resulting wake configuration is invalid
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::from_sources(file::load_config_from(path), |key| {
            std::env::var(key).ok()
        })
    }

    /// Merge a parsed file with environment lookups (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if the resulting wake configuration is invalid
    pub fn from_sources(
        fc: file::HarkenConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let defaults = WakeConfig::default();

        let activation_phrase = env("HARKEN_WAKE_PHRASE")
            .or(fc.wake.activation_phrase)
            .unwrap_or(defaults.activation_phrase);

        // The stock variants only make sense for the stock phrase
        let variants = fc.wake.variants.unwrap_or_else(|| {
            if activation_phrase == DEFAULT_PHRASE {
                defaults.variants
            } else {
                Vec::new()
            }
        });

        let wake = WakeConfig {
            activation_phrase,
            variants,
            sample_rate: fc.wake.sample_rate.unwrap_or(defaults.sample_rate),
            frame_ms: fc.wake.frame_ms.unwrap_or(defaults.frame_ms),
            listen_seconds: parse_env(&env, "HARKEN_LISTEN_SECONDS")
                .or(fc.wake.listen_seconds)
                .unwrap_or(defaults.listen_seconds),
            match_limit: fc.wake.match_limit.unwrap_or(defaults.match_limit),
            silence_limit: fc.wake.silence_limit.unwrap_or(defaults.silence_limit),
            unconfirmed_guard_ms: fc
                .wake
                .unconfirmed_guard_ms
                .unwrap_or(defaults.unconfirmed_guard_ms),
            vad_aggressiveness: parse_env(&env, "HARKEN_VAD_AGGRESSIVENESS")
                .or(fc.wake.vad_aggressiveness)
                .unwrap_or(defaults.vad_aggressiveness),
            vad_backend: fc.wake.vad_backend.unwrap_or(defaults.vad_backend),
            model_path: env("HARKEN_MODEL_PATH")
                .or(fc.wake.model_path)
                .map(PathBuf::from),
        };
        wake.validate()?;

        let voice_defaults = VoiceConfig::default();
        let voice = VoiceConfig {
            stt_provider: fc.voice.stt_provider.unwrap_or(voice_defaults.stt_provider),
            stt_model: env("HARKEN_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or(voice_defaults.stt_model),
            language: fc.voice.language,
            tts_provider: fc.voice.tts_provider.unwrap_or(voice_defaults.tts_provider),
            tts_model: env("HARKEN_TTS_MODEL")
                .or(fc.voice.tts_model)
                .unwrap_or(voice_defaults.tts_model),
            tts_voice: fc.voice.tts_voice.unwrap_or(voice_defaults.tts_voice),
            tts_speed: fc.voice.tts_speed.unwrap_or(voice_defaults.tts_speed),
            speak_replies: fc.voice.speak_replies.unwrap_or(voice_defaults.speak_replies),
        };

        // API keys (env > toml > None)
        let secret = |name: &str, file_value: Option<String>| {
            env(name)
                .or(file_value)
                .filter(|k| !k.is_empty())
                .map(SecretString::from)
        };
        let api_keys = ApiKeys {
            openai: secret("OPENAI_API_KEY", fc.api_keys.openai),
            deepgram: secret("DEEPGRAM_API_KEY", fc.api_keys.deepgram),
            elevenlabs: secret("ELEVENLABS_API_KEY", fc.api_keys.elevenlabs),
        };

        Ok(Self {
            wake,
            voice,
            api_keys,
            intents: fc.intents,
            fallback_reply: fc
                .fallback_reply
                .unwrap_or_else(|| DEFAULT_FALLBACK_REPLY.to_string()),
        })
    }
}

/// Parse an env var, warning and ignoring it when malformed
fn parse_env<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring malformed environment override");
            None
        }
    }
}
