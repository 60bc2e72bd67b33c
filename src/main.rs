use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use tracing_subscriber::EnvFilter;

use harken::daemon::replay_file;
use harken::voice::{
    AudioCapture, AudioPlayback, FrameSource, Synthesizer, TextToSpeech, calculate_energy,
    pcm16_to_wav,
};
use harken::{Config, Daemon};

/// Harken - wake word front end for robot voice commands
#[derive(Parser)]
#[command(name = "harken", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/harken/config.toml)
    #[arg(short, long, env = "HARKEN_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Listen on the microphone and answer commands (default)
    Run,
    /// Run the wake word detector over a WAV file
    Replay {
        /// Input WAV file
        wav: PathBuf,
        /// Write each captured utterance to this directory
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// Print the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity; RUST_LOG wins when set
    let filter = match cli.verbose {
        0 => "info,harken=info",
        1 => "info,harken=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            tracing::info!(
                phrase = %config.wake.activation_phrase,
                intents = config.intents.len(),
                "starting harken"
            );
            Daemon::new(config).run().await?;
        }
        Command::Replay { wav, out_dir } => replay(&config, &wav, out_dir.as_deref())?,
        Command::TestMic { duration } => test_mic(&config, duration)?,
        Command::TestSpeaker => test_speaker()?,
        Command::TestTts { text } => test_tts(&config, &text).await?,
        Command::ShowConfig => show_config(&config),
    }

    Ok(())
}

/// Run the detector over a file and report captured utterances
fn replay(config: &Config, wav: &Path, out_dir: Option<&Path>) -> anyhow::Result<()> {
    let utterances = replay_file(&config.wake, wav)?;
    let format = config.wake.frame_format()?;

    println!("{} utterance(s) captured from {}", utterances.len(), wav.display());
    for (i, pcm) in utterances.iter().enumerate() {
        println!(
            "  #{}: {} bytes ({:.2}s)",
            i + 1,
            pcm.len(),
            format.duration_of(pcm.len()).as_secs_f64()
        );

        if let Some(dir) = out_dir {
            std::fs::create_dir_all(dir)?;
            let path = dir.join(format!("utterance-{:03}.wav", i + 1));
            std::fs::write(&path, pcm16_to_wav(pcm, format.sample_rate)?)?;
            println!("      wrote {}", path.display());
        }
    }

    Ok(())
}

/// Test microphone input with a level meter
fn test_mic(config: &Config, duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let format = config.wake.frame_format()?;
    let mut capture = AudioCapture::new(format)?;
    capture.start()?;

    println!("Sample rate: {} Hz, {} ms frames", format.sample_rate, format.frame_ms);
    println!("---");

    let started = Instant::now();
    let mut second = 1;
    let mut samples: Vec<i16> = Vec::new();
    while started.elapsed() < Duration::from_secs(duration) {
        let Some(frame) = capture.read_frame()? else {
            break;
        };
        samples.extend_from_slice(frame.samples());

        if started.elapsed() >= Duration::from_secs(second) {
            let energy = calculate_energy(&samples);
            let peak = samples.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);

            // Visual meter
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let meter_len = (energy * 100.0).min(50.0) as usize;
            let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

            println!("[{second:2}s] RMS: {energy:.4} | Peak: {peak:5} | [{meter}]");
            samples.clear();
            second += 1;
        }
    }

    capture.stop();
    if capture.overruns() > 0 {
        println!("warning: {} samples dropped", capture.overruns());
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test speaker output with a sine wave
fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = AudioPlayback::new()?;

    let sample_rate = playback.sample_rate();
    let frequency = 440.0_f32;
    let num_samples = sample_rate as usize * 2;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
        })
        .collect();

    println!("Playing {} samples at {sample_rate} Hz...", samples.len());
    playback.play(samples)?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Test TTS output
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let tts = TextToSpeech::new(
        config.voice.tts_provider,
        config.api_keys.for_tts(config.voice.tts_provider)?,
        config.voice.tts_model.clone(),
        config.voice.tts_voice.clone(),
        config.voice.tts_speed,
    )?;

    println!("Synthesizing speech...");
    let mp3_data = tts.synthesize(text).await?;
    println!("Received {} bytes of audio", mp3_data.len());

    let playback = AudioPlayback::new()?;
    tokio::task::spawn_blocking(move || playback.play_mp3(&mp3_data)).await??;

    println!("Done!");
    Ok(())
}

/// Print the effective configuration with secrets masked
fn show_config(config: &Config) {
    let mask = |key: Option<&secrecy::SecretString>| match key {
        Some(k) => {
            let chars: Vec<char> = k.expose_secret().chars().collect();
            if chars.len() > 8 {
                format!("…{}", chars[chars.len() - 4..].iter().collect::<String>())
            } else {
                "set".to_string()
            }
        }
        None => "unset".to_string(),
    };

    let wake = &config.wake;
    println!("[wake]");
    println!("activation_phrase = {:?}", wake.activation_phrase);
    println!("variants = {:?}", wake.matcher().variants());
    println!("sample_rate = {}", wake.sample_rate);
    println!("frame_ms = {}", wake.frame_ms);
    println!("listen_seconds = {}", wake.listen_seconds);
    println!("match_limit = {}", wake.match_limit);
    println!("silence_limit = {}", wake.silence_limit);
    println!("unconfirmed_guard_ms = {}", wake.unconfirmed_guard_ms);
    println!("vad_aggressiveness = {}", wake.vad_aggressiveness);
    println!("vad_backend = {:?}", wake.vad_backend);
    println!(
        "model_path = {}",
        wake.model_path
            .as_ref()
            .map_or_else(|| "unset".to_string(), |p| p.display().to_string())
    );

    let voice = &config.voice;
    println!("\n[voice]");
    println!("stt = {:?} / {}", voice.stt_provider, voice.stt_model);
    println!("tts = {:?} / {} ({}, x{})", voice.tts_provider, voice.tts_model, voice.tts_voice, voice.tts_speed);
    println!("speak_replies = {}", voice.speak_replies);

    println!("\n[api_keys]");
    println!("openai = {}", mask(config.api_keys.openai.as_ref()));
    println!("deepgram = {}", mask(config.api_keys.deepgram.as_ref()));
    println!("elevenlabs = {}", mask(config.api_keys.elevenlabs.as_ref()));

    println!("\n{} intent rule(s)", config.intents.len());
    for rule in &config.intents {
        println!("  {} = /{}/", rule.name, rule.pattern);
    }
    println!("fallback_reply = {:?}", config.fallback_reply);
}
