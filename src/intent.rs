//! Intent routing for transcribed commands
//!
//! Maps a transcript to an action name and a spoken reply. The built-in
//! [`RuleRouter`] tries regex rules in configured order against normalized
//! text; the first match wins.

use regex::Regex;
use serde::Deserialize;

use crate::voice::{WakeMatcher, normalize};

/// Outcome of routing one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Matched intent name, `None` for the fallback
    pub intent: Option<String>,
    /// Text to speak back
    pub reply: String,
}

/// Classifies transcribed text into an action and a reply
pub trait IntentRouter: Send + Sync {
    /// Route a command
    fn route(&self, text: &str) -> Route;
}

/// Intent rule configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IntentRule {
    /// Intent name (e.g. "battery")
    pub name: String,
    /// Regex pattern matched against the normalized command
    pub pattern: String,
    /// Reply template; `{{text}}` expands to the command
    pub reply: String,
    /// Case insensitive matching
    #[serde(default = "default_true")]
    pub case_insensitive: bool,
}

const fn default_true() -> bool {
    true
}

/// Compiled intent rule
struct CompiledRule {
    name: String,
    pattern: Regex,
    reply: String,
}

impl CompiledRule {
    fn compile(rule: &IntentRule) -> Result<Self, regex::Error> {
        let pattern = if rule.case_insensitive {
            Regex::new(&format!("(?i){}", rule.pattern))?
        } else {
            Regex::new(&rule.pattern)?
        };

        Ok(Self {
            name: rule.name.clone(),
            pattern,
            reply: rule.reply.clone(),
        })
    }
}

/// Routes commands with ordered regex rules
pub struct RuleRouter {
    rules: Vec<CompiledRule>,
    fallback_reply: String,
}

impl RuleRouter {
    /// Compile rules
    ///
    /// Invalid rules are logged and skipped.
    #[must_use]
    pub fn new(rules: &[IntentRule], fallback_reply: impl Into<String>) -> Self {
        let compiled: Vec<_> = rules
            .iter()
            .filter_map(|r| match CompiledRule::compile(r) {
                Ok(compiled) => Some(compiled),
                Err(e) => {
                    tracing::warn!(
                        intent = %r.name,
                        pattern = %r.pattern,
                        error = %e,
                        "invalid intent pattern, skipping"
                    );
                    None
                }
            })
            .collect();

        tracing::info!(count = compiled.len(), "loaded intent rules");

        Self {
            rules: compiled,
            fallback_reply: fallback_reply.into(),
        }
    }

    /// Number of usable rules
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rule compiled
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl IntentRouter for RuleRouter {
    fn route(&self, text: &str) -> Route {
        let command = normalize_command(text);

        for rule in &self.rules {
            if rule.pattern.is_match(&command) {
                tracing::debug!(intent = %rule.name, command, "intent matched");
                return Route {
                    intent: Some(rule.name.clone()),
                    reply: rule.reply.replace("{{text}}", &command),
                };
            }
        }

        tracing::debug!(command, "no intent matched");
        Route {
            intent: None,
            reply: self.fallback_reply.clone(),
        }
    }
}

/// Normalize a command: fold case and accents, drop punctuation, collapse spaces
#[must_use]
pub fn normalize_command(text: &str) -> String {
    let folded: String = normalize(text)
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drop everything up to and including the wake phrase
///
/// Returns the whole normalized transcript when no variant is present.
#[must_use]
pub fn strip_wake_phrase(transcript: &str, matcher: &WakeMatcher) -> String {
    let command = normalize_command(transcript);
    matcher
        .matched_variant(&command)
        .and_then(|variant| {
            command
                .find(variant)
                .map(|pos| command[pos + variant.len()..].trim().to_string())
        })
        .unwrap_or(command)
}
