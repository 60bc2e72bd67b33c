//! Voice activity gates: per-frame speech/silence classification

use earshot::{VoiceActivityDetector, VoiceActivityProfile};
use serde::Deserialize;

use super::frame::{Frame, FrameFormat};
use crate::{Error, Result};

/// Classifies a single frame as speech or silence
///
/// Implementations must be bounded-time and must not block. A frame the gate
/// cannot classify is reported as silence.
pub trait VoiceActivityGate: Send {
    /// Whether the frame contains speech
    fn is_speech(&mut self, frame: &Frame) -> bool;
}

impl<G: VoiceActivityGate + ?Sized> VoiceActivityGate for Box<G> {
    fn is_speech(&mut self, frame: &Frame) -> bool {
        (**self).is_speech(frame)
    }
}

/// Sensitivity level, from most permissive (0) to most aggressive (3)
///
/// Higher levels reject more non-speech at the cost of missing quiet speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Aggressiveness {
    /// Level 0
    Quality,
    /// Level 1
    #[default]
    LowBitrate,
    /// Level 2
    Aggressive,
    /// Level 3
    VeryAggressive,
}

impl TryFrom<u8> for Aggressiveness {
    type Error = Error;

    fn try_from(level: u8) -> Result<Self> {
        match level {
            0 => Ok(Self::Quality),
            1 => Ok(Self::LowBitrate),
            2 => Ok(Self::Aggressive),
            3 => Ok(Self::VeryAggressive),
            other => Err(Error::Config(format!(
                "vad aggressiveness must be 0-3, got {other}"
            ))),
        }
    }
}

impl Aggressiveness {
    /// Numeric level (0-3)
    #[must_use]
    pub const fn level(self) -> u8 {
        match self {
            Self::Quality => 0,
            Self::LowBitrate => 1,
            Self::Aggressive => 2,
            Self::VeryAggressive => 3,
        }
    }

    const fn profile(self) -> VoiceActivityProfile {
        match self {
            Self::Quality => VoiceActivityProfile::QUALITY,
            Self::LowBitrate => VoiceActivityProfile::LBR,
            Self::Aggressive => VoiceActivityProfile::AGGRESSIVE,
            Self::VeryAggressive => VoiceActivityProfile::VERY_AGGRESSIVE,
        }
    }

    /// RMS threshold used by [`EnergyGate`]
    const fn energy_threshold(self) -> f32 {
        match self {
            Self::Quality => 0.01,
            Self::LowBitrate => 0.02,
            Self::Aggressive => 0.03,
            Self::VeryAggressive => 0.05,
        }
    }
}

/// Which gate implementation to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VadBackend {
    /// WebRTC-style detector from `earshot`
    #[default]
    Earshot,
    /// RMS energy threshold
    Energy,
}

/// Build the configured gate
///
/// # Errors
///
/// Returns error if the backend cannot handle the frame format
pub fn build_gate(
    backend: VadBackend,
    aggressiveness: Aggressiveness,
    format: FrameFormat,
) -> Result<Box<dyn VoiceActivityGate>> {
    Ok(match backend {
        VadBackend::Earshot => Box::new(EarshotGate::new(aggressiveness, format)?),
        VadBackend::Energy => Box::new(EnergyGate::new(aggressiveness)),
    })
}

/// Gate backed by the `earshot` voice activity detector
pub struct EarshotGate {
    detector: VoiceActivityDetector,
    aggressiveness: Aggressiveness,
}

impl EarshotGate {
    /// Create an earshot gate
    ///
    /// # Errors
    ///
    /// Returns error unless frames are 16 kHz
    pub fn new(aggressiveness: Aggressiveness, format: FrameFormat) -> Result<Self> {
        if format.sample_rate != 16000 {
            return Err(Error::Config(format!(
                "earshot vad requires 16000 Hz frames, got {} Hz",
                format.sample_rate
            )));
        }

        tracing::debug!(level = aggressiveness.level(), "earshot vad initialized");

        Ok(Self {
            detector: VoiceActivityDetector::new(aggressiveness.profile()),
            aggressiveness,
        })
    }

    /// Configured sensitivity
    #[must_use]
    pub const fn aggressiveness(&self) -> Aggressiveness {
        self.aggressiveness
    }
}

impl VoiceActivityGate for EarshotGate {
    fn is_speech(&mut self, frame: &Frame) -> bool {
        match self.detector.predict_16khz(frame.samples()) {
            Ok(speech) => speech,
            Err(e) => {
                tracing::trace!(error = ?e, "vad rejected frame, treating as silence");
                false
            }
        }
    }
}

/// Gate that flags frames whose RMS energy exceeds a per-level threshold
///
/// Stateless: the same frame always gets the same answer.
#[derive(Debug, Clone, Copy)]
pub struct EnergyGate {
    threshold: f32,
}

impl EnergyGate {
    /// Create an energy gate for a sensitivity level
    #[must_use]
    pub const fn new(aggressiveness: Aggressiveness) -> Self {
        Self {
            threshold: aggressiveness.energy_threshold(),
        }
    }

    /// Create an energy gate with an explicit RMS threshold
    #[must_use]
    pub const fn with_threshold(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl VoiceActivityGate for EnergyGate {
    fn is_speech(&mut self, frame: &Frame) -> bool {
        calculate_energy(frame.samples()) > self.threshold
    }
}

/// RMS energy of PCM16 samples, normalized to `[0.0, 1.0]`
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn calculate_energy(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples
        .iter()
        .map(|&s| {
            let v = f32::from(s) / 32768.0;
            v * v
        })
        .sum();
    (sum_squares / samples.len() as f32).sqrt()
}
