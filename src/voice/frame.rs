//! Fixed-duration PCM16 mono audio frames

use std::sync::Arc;
use std::time::Duration;

use crate::{Error, Result};

/// Frame durations accepted by the voice activity gates
pub const SUPPORTED_FRAME_MS: [u32; 3] = [10, 20, 30];

/// Sample rates accepted by the voice activity gates
pub const SUPPORTED_SAMPLE_RATES: [u32; 4] = [8000, 16000, 32000, 48000];

/// Bytes per PCM16 sample
pub const BYTES_PER_SAMPLE: usize = 2;

/// An immutable block of signed 16-bit mono samples
///
/// Cloning is cheap: the sample storage is shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    samples: Arc<[i16]>,
}

impl Frame {
    /// Wrap a block of samples
    #[must_use]
    pub fn new(samples: Vec<i16>) -> Self {
        Self {
            samples: samples.into(),
        }
    }

    /// Build a frame from little-endian PCM16 bytes
    ///
    /// A trailing odd byte is ignored.
    #[must_use]
    pub fn from_le_bytes(bytes: &[u8]) -> Self {
        let samples = bytes
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect::<Vec<_>>();
        Self::new(samples)
    }

    /// A frame of digital silence
    #[must_use]
    pub fn silent(samples: usize) -> Self {
        Self::new(vec![0; samples])
    }

    /// The raw samples
    #[must_use]
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Number of samples
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the frame holds no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Size of the frame in bytes when serialized as PCM16
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.samples.len() * BYTES_PER_SAMPLE
    }

    /// Append the frame as little-endian PCM16 bytes
    pub fn write_le_bytes(&self, out: &mut Vec<u8>) {
        out.reserve(self.byte_len());
        for sample in self.samples.iter() {
            out.extend_from_slice(&sample.to_le_bytes());
        }
    }

    /// Serialize as little-endian PCM16 bytes
    #[must_use]
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        self.write_le_bytes(&mut out);
        out
    }
}

impl From<Vec<i16>> for Frame {
    fn from(samples: Vec<i16>) -> Self {
        Self::new(samples)
    }
}

/// Sample rate and frame duration shared by every stage of the frame path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    /// Samples per second
    pub sample_rate: u32,
    /// Duration of one frame in milliseconds
    pub frame_ms: u32,
}

impl FrameFormat {
    /// Create a validated frame format
    ///
    /// # Errors
    ///
    /// Returns error if the sample rate or frame duration is unsupported
    pub fn new(sample_rate: u32, frame_ms: u32) -> Result<Self> {
        if !SUPPORTED_SAMPLE_RATES.contains(&sample_rate) {
            return Err(Error::Config(format!(
                "unsupported sample rate {sample_rate} Hz (expected one of {SUPPORTED_SAMPLE_RATES:?})"
            )));
        }
        if !SUPPORTED_FRAME_MS.contains(&frame_ms) {
            return Err(Error::Config(format!(
                "unsupported frame duration {frame_ms} ms (expected one of {SUPPORTED_FRAME_MS:?})"
            )));
        }
        Ok(Self {
            sample_rate,
            frame_ms,
        })
    }

    /// Samples in one frame: `sample_rate / 1000 * frame_ms`
    #[must_use]
    pub const fn samples_per_frame(&self) -> usize {
        (self.sample_rate / 1000 * self.frame_ms) as usize
    }

    /// Bytes in one frame
    #[must_use]
    pub const fn bytes_per_frame(&self) -> usize {
        self.samples_per_frame() * BYTES_PER_SAMPLE
    }

    /// Number of PCM16 bytes covering `duration`
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn bytes_for(&self, duration: Duration) -> usize {
        let samples = duration.as_secs_f64() * f64::from(self.sample_rate);
        samples.round() as usize * BYTES_PER_SAMPLE
    }

    /// Duration covered by `bytes` of PCM16 audio
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_of(&self, bytes: usize) -> Duration {
        let samples = (bytes / BYTES_PER_SAMPLE) as f64;
        Duration::from_secs_f64(samples / f64::from(self.sample_rate))
    }
}

/// Supplies frames in strict temporal order
///
/// `read_frame` blocks until a full frame is available. `Ok(None)` marks the
/// end of the stream.
pub trait FrameSource {
    /// Read the next frame
    ///
    /// # Errors
    ///
    /// Returns error if the underlying device or file fails
    fn read_frame(&mut self) -> Result<Option<Frame>>;

    /// Format of the frames this source produces
    fn format(&self) -> FrameFormat;
}

/// Split a sample stream into whole frames, zero-padding the tail
#[must_use]
pub fn frames_from_samples(samples: &[i16], format: FrameFormat) -> Vec<Frame> {
    let per_frame = format.samples_per_frame();
    samples
        .chunks(per_frame)
        .map(|chunk| {
            let mut block = chunk.to_vec();
            block.resize(per_frame, 0);
            Frame::new(block)
        })
        .collect()
}

/// Convert an f32 sample in `[-1.0, 1.0]` to PCM16
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}
