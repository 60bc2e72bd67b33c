//! Daemon - the voice command service
//!
//! A dedicated thread pulls frames from the microphone and runs the wake word
//! detector at the frame rate. Captured utterances cross a bounded channel to
//! the async side, which transcribes, routes and speaks the reply.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use tokio::sync::mpsc;

use crate::config::{Config, WakeConfig};
use crate::intent::{IntentRouter, Route, RuleRouter, strip_wake_phrase};
use crate::voice::{
    AudioCapture, AudioPlayback, Frame, FrameSource, GrammarRecognizer, LogObserver,
    SpeechToText, Synthesizer, TextToSpeech, Transcriber, TriggerState, TriggerStateMachine,
    WakeMatcher, WakeWordDetector, WavFrameSource, build_gate,
};
use crate::{Error, Result};

/// Utterances allowed to queue while the async side is busy
const UTTERANCE_QUEUE: usize = 4;

/// Outcome of handling one captured utterance
#[derive(Debug, Clone)]
pub struct Reply {
    /// Raw transcript
    pub transcript: String,
    /// Transcript with the wake phrase removed
    pub command: String,
    /// Routing decision
    pub route: Route,
    /// Synthesized reply audio (MP3), when speech output is enabled
    pub audio: Option<Vec<u8>>,
}

/// Transcribe, route and optionally synthesize a captured utterance
pub struct VoicePipeline {
    transcriber: Arc<dyn Transcriber>,
    router: Arc<dyn IntentRouter>,
    synthesizer: Option<Arc<dyn Synthesizer>>,
    matcher: WakeMatcher,
}

impl VoicePipeline {
    /// Create a pipeline without speech output
    #[must_use]
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        router: Arc<dyn IntentRouter>,
        matcher: WakeMatcher,
    ) -> Self {
        Self {
            transcriber,
            router,
            synthesizer: None,
            matcher,
        }
    }

    /// Enable speech output
    #[must_use]
    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn Synthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    /// Build the pipeline from configuration
    ///
    /// # Errors
    ///
    /// Returns error if a required API key is missing
    pub fn from_config(config: &Config) -> Result<Self> {
        let stt = SpeechToText::new(
            config.voice.stt_provider,
            config.api_keys.for_stt(config.voice.stt_provider)?,
            config.voice.stt_model.clone(),
        )?
        .with_language(config.voice.language.clone());

        let router = RuleRouter::new(&config.intents, config.fallback_reply.clone());
        let pipeline = Self::new(Arc::new(stt), Arc::new(router), config.wake.matcher());

        if !config.voice.speak_replies {
            return Ok(pipeline);
        }

        let tts = TextToSpeech::new(
            config.voice.tts_provider,
            config.api_keys.for_tts(config.voice.tts_provider)?,
            config.voice.tts_model.clone(),
            config.voice.tts_voice.clone(),
            config.voice.tts_speed,
        )?;
        Ok(pipeline.with_synthesizer(Arc::new(tts)))
    }

    /// Handle one utterance
    ///
    /// Returns `None` when the transcript is empty.
    ///
    /// # Errors
    ///
    /// Returns error if transcription or synthesis fails
    pub async fn handle_utterance(&self, pcm: &[u8], sample_rate: u32) -> Result<Option<Reply>> {
        let transcript = self.transcriber.transcribe(pcm, sample_rate).await?;
        if transcript.trim().is_empty() {
            tracing::info!(bytes = pcm.len(), "empty transcript, skipping");
            return Ok(None);
        }

        let command = strip_wake_phrase(&transcript, &self.matcher);
        let route = self.router.route(&command);
        tracing::info!(
            command,
            intent = route.intent.as_deref().unwrap_or("<fallback>"),
            "command routed"
        );

        let audio = match &self.synthesizer {
            Some(tts) if !route.reply.is_empty() => Some(tts.synthesize(&route.reply).await?),
            _ => None,
        };

        Ok(Some(Reply {
            transcript,
            command,
            route,
            audio,
        }))
    }
}

/// The harken daemon
pub struct Daemon {
    config: Config,
}

impl Daemon {
    /// Create a new daemon instance
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if the pipeline or the frame loop cannot start
    pub async fn run(self) -> Result<()> {
        let pipeline = VoicePipeline::from_config(&self.config)?;
        let playback = if self.config.voice.speak_replies {
            Some(Arc::new(AudioPlayback::new()?))
        } else {
            None
        };
        let sample_rate = self.config.wake.sample_rate;

        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(UTTERANCE_QUEUE);
        let stop = Arc::new(AtomicBool::new(false));
        let frame_loop = spawn_frame_loop(self.config.wake.clone(), tx, Arc::clone(&stop))?;

        tracing::info!(
            phrase = %self.config.wake.activation_phrase,
            "listening for wake word"
        );

        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "failed to listen for ctrl-c");
                    }
                    tracing::info!("shutdown requested");
                    break;
                }
                utterance = rx.recv() => {
                    let Some(pcm) = utterance else {
                        tracing::warn!("frame loop stopped");
                        break;
                    };
                    if let Err(e) = respond(&pipeline, playback.as_ref(), &pcm, sample_rate).await {
                        tracing::error!(error = %e, "failed to handle utterance");
                    }
                }
            }
        }

        stop.store(true, Ordering::Release);
        drop(rx);
        frame_loop
            .join()
            .map_err(|_| Error::Voice("frame loop panicked".to_string()))?
    }
}

/// Run the pipeline on one utterance and play the reply
async fn respond(
    pipeline: &VoicePipeline,
    playback: Option<&Arc<AudioPlayback>>,
    pcm: &[u8],
    sample_rate: u32,
) -> Result<()> {
    let Some(reply) = pipeline.handle_utterance(pcm, sample_rate).await? else {
        return Ok(());
    };

    if let (Some(playback), Some(audio)) = (playback, reply.audio) {
        let playback = Arc::clone(playback);
        tokio::task::spawn_blocking(move || playback.play_mp3(&audio))
            .await
            .map_err(|e| Error::Audio(format!("playback task failed: {e}")))??;
    } else {
        tracing::info!(reply = %reply.route.reply, "reply");
    }
    Ok(())
}

/// Start the frame loop on its own thread
///
/// The microphone stream is opened on that thread since cpal streams are not
/// `Send`. Setup errors surface through the join handle after the sender drops.
fn spawn_frame_loop(
    wake: WakeConfig,
    tx: mpsc::Sender<Vec<u8>>,
    stop: Arc<AtomicBool>,
) -> Result<JoinHandle<Result<()>>> {
    std::thread::Builder::new()
        .name("harken-frames".to_string())
        .spawn(move || {
            let result = run_frame_loop(&wake, &tx, &stop);
            if let Err(e) = &result {
                tracing::error!(error = %e, "frame loop failed");
            }
            result
        })
        .map_err(Error::Io)
}

fn run_frame_loop(wake: &WakeConfig, tx: &mpsc::Sender<Vec<u8>>, stop: &AtomicBool) -> Result<()> {
    let mut detector = build_detector(wake)?;
    let mut capture = AudioCapture::new(wake.frame_format()?)?;
    capture.start()?;

    let frames = pump_frames(&mut capture, &mut detector, stop, |pcm| {
        tx.blocking_send(pcm).is_ok()
    })?;

    capture.stop();
    tracing::info!(frames, overruns = capture.overruns(), "frame loop finished");
    Ok(())
}

/// Feed frames from `source` through `detector` until the source ends,
/// `stop` is set, or `sink` refuses an utterance
///
/// Returns the number of frames processed.
///
/// # Errors
///
/// Returns error if the source fails
pub fn pump_frames<S, G, R>(
    source: &mut S,
    detector: &mut WakeWordDetector<G, R>,
    stop: &AtomicBool,
    mut sink: impl FnMut(Vec<u8>) -> bool,
) -> Result<u64>
where
    S: FrameSource,
    G: crate::voice::VoiceActivityGate,
    R: GrammarRecognizer,
{
    let mut frames = 0_u64;
    while !stop.load(Ordering::Acquire) {
        let Some(frame) = source.read_frame()? else {
            break;
        };
        frames += 1;
        tracing::trace!(frame = frames, state = ?detector.state(), "frame");

        if let Some(pcm) = detector.process(frame)
            && !sink(pcm)
        {
            tracing::debug!("utterance receiver closed");
            break;
        }
    }
    Ok(frames)
}

/// Assemble the gate, recognizer and state machine for a wake configuration
///
/// # Errors
///
/// Returns error if any component cannot be constructed
pub fn build_detector(wake: &WakeConfig) -> Result<WakeWordDetector> {
    wake.validate()?;
    let format = wake.frame_format()?;
    let gate = build_gate(wake.vad_backend, wake.aggressiveness()?, format)?;
    let recognizer = build_recognizer(wake)?;
    let machine =
        TriggerStateMachine::new(wake.matcher(), wake.trigger_limits()?)?.with_observer(LogObserver);
    Ok(WakeWordDetector::new(gate, recognizer, machine))
}

#[cfg(feature = "vosk")]
fn build_recognizer(wake: &WakeConfig) -> Result<Box<dyn GrammarRecognizer>> {
    let model_path = wake.model_path.as_deref().ok_or_else(|| {
        Error::Config("wake.model_path (or HARKEN_MODEL_PATH) is required".to_string())
    })?;
    let recognizer =
        crate::voice::VoskRecognizer::new(model_path, wake.sample_rate, &wake.grammar_phrases())?;
    Ok(Box::new(recognizer))
}

#[cfg(not(feature = "vosk"))]
fn build_recognizer(_wake: &WakeConfig) -> Result<Box<dyn GrammarRecognizer>> {
    Err(Error::Config(
        "no wake word recognizer available; rebuild with the `vosk` feature".to_string(),
    ))
}

/// Run the detector over a WAV file, returning every captured utterance
///
/// After the file ends, `silence_limit` silent frames are fed so a confirmed
/// capture still in progress completes the way it would on a live stream.
///
/// # Errors
///
/// Returns error if the file cannot be read or the detector cannot be built
pub fn replay_file(wake: &WakeConfig, path: &Path) -> Result<Vec<Vec<u8>>> {
    let mut detector = build_detector(wake)?;
    replay_with(&mut detector, path, wake)
}

/// Replay a WAV file through an already built detector
///
/// # Errors
///
/// Returns error if the file cannot be read
pub fn replay_with<G, R>(
    detector: &mut WakeWordDetector<G, R>,
    path: &Path,
    wake: &WakeConfig,
) -> Result<Vec<Vec<u8>>>
where
    G: crate::voice::VoiceActivityGate,
    R: GrammarRecognizer,
{
    let format = wake.frame_format()?;
    let mut source = WavFrameSource::open(path, format)?;
    let mut utterances = Vec::new();

    let frames = pump_frames(&mut source, detector, &AtomicBool::new(false), |pcm| {
        utterances.push(pcm);
        true
    })?;

    for _ in 0..wake.silence_limit {
        if detector.state() == TriggerState::Idle {
            break;
        }
        if let Some(pcm) = detector.process(Frame::silent(format.samples_per_frame())) {
            utterances.push(pcm);
        }
    }

    tracing::info!(
        path = %path.display(),
        frames,
        utterances = utterances.len(),
        "replay finished"
    );
    Ok(utterances)
}
