//! Grammar-constrained continuous recognizer interface

use super::frame::Frame;

/// One recognizer output for one consumed frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hypothesis {
    /// Tentative text covering audio seen so far (may be empty)
    Partial(String),
    /// Committed text for a completed segment
    Final(String),
}

impl Hypothesis {
    /// Build a partial hypothesis, lowercasing and trimming the text
    #[must_use]
    pub fn partial(text: impl AsRef<str>) -> Self {
        Self::Partial(clean(text.as_ref()))
    }

    /// Build a final hypothesis, lowercasing and trimming the text
    #[must_use]
    pub fn final_text(text: impl AsRef<str>) -> Self {
        Self::Final(clean(text.as_ref()))
    }

    /// The hypothesis text
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Partial(t) | Self::Final(t) => t,
        }
    }

    /// Whether this is a final hypothesis
    #[must_use]
    pub const fn is_final(&self) -> bool {
        matches!(self, Self::Final(_))
    }
}

fn clean(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Continuous recognizer restricted to a closed grammar of wake phrases
///
/// Stateful across calls. Emits at most one hypothesis per frame; any
/// internal failure is reported as `None` rather than an error so the frame
/// path never aborts.
pub trait GrammarRecognizer: Send {
    /// Consume one frame
    fn accept(&mut self, frame: &Frame) -> Option<Hypothesis>;
}

impl<R: GrammarRecognizer + ?Sized> GrammarRecognizer for Box<R> {
    fn accept(&mut self, frame: &Frame) -> Option<Hypothesis> {
        (**self).accept(frame)
    }
}

#[cfg(feature = "vosk")]
pub use self::vosk_backend::VoskRecognizer;

#[cfg(feature = "vosk")]
mod vosk_backend {
    use std::path::Path;

    use vosk::{DecodingState, Model, Recognizer};

    use super::{GrammarRecognizer, Hypothesis};
    use crate::voice::frame::Frame;
    use crate::{Error, Result};

    /// Token Vosk uses for out-of-grammar audio
    const UNKNOWN_TOKEN: &str = "[unk]";

    /// Vosk recognizer constrained to the wake phrase variants
    pub struct VoskRecognizer {
        recognizer: Recognizer,
    }

    impl VoskRecognizer {
        /// Load a Vosk model and build a grammar recognizer over `variants`
        ///
        /// # Errors
        ///
        /// Returns error if the model directory cannot be loaded or the
        /// grammar is rejected
        #[allow(clippy::cast_precision_loss)]
        pub fn new(model_path: &Path, sample_rate: u32, variants: &[String]) -> Result<Self> {
            if variants.is_empty() {
                return Err(Error::Config("wake grammar has no variants".to_string()));
            }

            let model = Model::new(model_path.to_string_lossy()).ok_or_else(|| {
                Error::WakeWord(format!(
                    "failed to load vosk model from {}",
                    model_path.display()
                ))
            })?;

            let mut grammar: Vec<&str> = variants.iter().map(String::as_str).collect();
            grammar.push(UNKNOWN_TOKEN);

            let recognizer = Recognizer::new_with_grammar(&model, sample_rate as f32, &grammar)
                .ok_or_else(|| Error::WakeWord("vosk rejected the wake grammar".to_string()))?;

            tracing::info!(
                model = %model_path.display(),
                sample_rate,
                grammar = ?grammar,
                "vosk recognizer initialized"
            );

            Ok(Self { recognizer })
        }
    }

    impl GrammarRecognizer for VoskRecognizer {
        fn accept(&mut self, frame: &Frame) -> Option<Hypothesis> {
            match self.recognizer.accept_waveform(frame.samples()) {
                Ok(DecodingState::Finalized) => {
                    let text = self
                        .recognizer
                        .result()
                        .single()
                        .map(|r| r.text.to_string())
                        .unwrap_or_default();
                    Some(Hypothesis::final_text(text))
                }
                Ok(DecodingState::Running) => {
                    Some(Hypothesis::partial(self.recognizer.partial_result().partial))
                }
                Ok(DecodingState::Failed) => {
                    tracing::trace!("vosk decoding failed for frame");
                    None
                }
                Err(e) => {
                    tracing::trace!(error = ?e, "vosk rejected frame");
                    None
                }
            }
        }
    }
}
