//! Microphone capture as a blocking frame source

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};

use super::frame::{Frame, FrameFormat, FrameSource, f32_to_i16};
use crate::{Error, Result};

/// How long a blocked read waits before re-checking that the stream is alive
const READ_POLL: Duration = Duration::from_millis(100);

/// Upper bound on queued samples (10 s at 48 kHz) if the reader stalls
const MAX_QUEUED_SAMPLES: usize = 480_000;

#[derive(Default)]
struct Shared {
    samples: Mutex<Queue>,
    ready: Condvar,
}

#[derive(Default)]
struct Queue {
    samples: VecDeque<i16>,
    running: bool,
    overruns: u64,
}

/// Captures PCM16 mono audio from the default input device
///
/// The cpal callback only converts and enqueues samples; framing happens on
/// the reader's side in [`FrameSource::read_frame`]. Not `Send`, because
/// cpal streams are not.
pub struct AudioCapture {
    config: StreamConfig,
    format: FrameFormat,
    shared: Arc<Shared>,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Open the default input device for the given frame format
    ///
    /// # Errors
    ///
    /// Returns error if no input device supports mono capture at the
    /// requested sample rate
    pub fn new(format: FrameFormat) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let rate = SampleRate(format.sample_rate);
        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| c.channels() == 1 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

        let config = supported_config.with_sample_rate(rate).config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = format.sample_rate,
            frame_ms = format.frame_ms,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Self {
            config,
            format,
            shared: Arc::new(Shared::default()),
            stream: None,
        })
    }

    /// Start capturing audio
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be built or started
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device".to_string()))?;

        let stream = device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mut queue = shared.samples.lock().unwrap_or_else(PoisonError::into_inner);
                    queue.samples.extend(data.iter().copied().map(f32_to_i16));
                    let excess = queue.samples.len().saturating_sub(MAX_QUEUED_SAMPLES);
                    if excess > 0 {
                        queue.samples.drain(..excess);
                        queue.overruns += 1;
                    }
                    drop(queue);
                    shared.ready.notify_one();
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.lock_queue().running = true;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    /// Stop capturing audio
    ///
    /// Samples already queued can still be read; after that `read_frame`
    /// reports end of stream.
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            self.lock_queue().running = false;
            self.shared.ready.notify_all();
            tracing::debug!("audio capture stopped");
        }
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    /// Times the queue overflowed because frames were not read fast enough
    #[must_use]
    pub fn overruns(&self) -> u64 {
        self.lock_queue().overruns
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, Queue> {
        self.shared
            .samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl FrameSource for AudioCapture {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let per_frame = self.format.samples_per_frame();
        let mut queue = self.lock_queue();

        loop {
            if queue.samples.len() >= per_frame {
                let block: Vec<i16> = queue.samples.drain(..per_frame).collect();
                return Ok(Some(Frame::new(block)));
            }
            if !queue.running {
                return Ok(None);
            }
            queue = self
                .shared
                .ready
                .wait_timeout(queue, READ_POLL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn format(&self) -> FrameFormat {
        self.format
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Wrap little-endian PCM16 mono bytes in a WAV container for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn pcm16_to_wav(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for pair in pcm.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_pcm16_to_wav() {
        let pcm = Frame::new(vec![0, 1000, -1000, i16::MAX, i16::MIN]).to_le_bytes();
        let wav = pcm16_to_wav(&pcm, 16000).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");

        let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.spec().channels, 1);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 1000, -1000, i16::MAX, i16::MIN]);
    }
}
