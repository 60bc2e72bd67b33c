//! WAV file replay as a frame source

use std::collections::VecDeque;
use std::path::Path;

use super::frame::{Frame, FrameFormat, FrameSource, f32_to_i16, frames_from_samples};
use crate::{Error, Result};

/// Serves the frames of a WAV file, converted to the target format
///
/// Multi-channel audio is averaged down to mono and resampled when the file
/// rate differs from the target rate.
pub struct WavFrameSource {
    format: FrameFormat,
    frames: VecDeque<Frame>,
}

impl WavFrameSource {
    /// Load a WAV file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, decoded or resampled
    #[allow(clippy::cast_precision_loss)]
    pub fn open(path: &Path, format: FrameFormat) -> Result<Self> {
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let scale = (1_i64 << spec.bits_per_sample.saturating_sub(1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<_, _>>()?
            }
        };

        let mono = downmix(&interleaved, usize::from(spec.channels));
        let samples = if spec.sample_rate == format.sample_rate {
            mono
        } else {
            resample_audio(&mono, spec.sample_rate, format.sample_rate)?
        };

        let pcm: Vec<i16> = samples.into_iter().map(f32_to_i16).collect();
        let frames = frames_from_samples(&pcm, format);

        tracing::debug!(
            path = %path.display(),
            file_rate = spec.sample_rate,
            channels = spec.channels,
            frames = frames.len(),
            "wav replay loaded"
        );

        Ok(Self {
            format,
            frames: frames.into(),
        })
    }

    /// Frames not yet read
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for WavFrameSource {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.frames.pop_front())
    }

    fn format(&self) -> FrameFormat {
        self.format
    }
}

/// Average interleaved channels into mono
#[allow(clippy::cast_precision_loss)]
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Resample audio using rubato
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn resample_audio(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    let chunk_size = 1024;
    let sub_chunks = 2;

    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, chunk_size, sub_chunks, 1)
            .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    let mut input: Vec<f64> = samples.iter().map(|&s| f64::from(s)).collect();

    // Pad the tail so the last partial chunk is not dropped
    let remainder = input.len() % chunk_size;
    if remainder != 0 {
        input.resize(input.len() + chunk_size - remainder, 0.0);
    }

    let mut output = Vec::new();
    for chunk in input.chunks(chunk_size) {
        let result = resampler
            .process(&[chunk.to_vec()], None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend_from_slice(&result[0]);
    }

    Ok(output.iter().map(|&s| s as f32).collect())
}
