//! Wake phrase normalization and matching

/// Combining diacritical marks left over from decomposed input
const COMBINING_MARKS: std::ops::RangeInclusive<char> = '\u{0300}'..='\u{036F}';

/// Lowercase text and strip accent marks
///
/// `"OK RÓBOT"` becomes `"ok robot"`, whether the accent is precomposed or a
/// combining mark. Characters outside the Latin accent table pass through
/// lowercased.
#[must_use]
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !COMBINING_MARKS.contains(c))
        .flat_map(char::to_lowercase)
        .map(fold_accent)
        .collect()
}

/// Map an accented lowercase Latin letter to its base letter
const fn fold_accent(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => 'a',
        'ç' | 'ć' | 'ĉ' | 'ċ' | 'č' => 'c',
        'ď' | 'đ' => 'd',
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => 'e',
        'ĝ' | 'ğ' | 'ġ' | 'ģ' => 'g',
        'ĥ' | 'ħ' => 'h',
        'ì' | 'í' | 'î' | 'ï' | 'ĩ' | 'ī' | 'ĭ' | 'į' | 'ı' => 'i',
        'ĵ' => 'j',
        'ķ' => 'k',
        'ĺ' | 'ļ' | 'ľ' | 'ŀ' | 'ł' => 'l',
        'ñ' | 'ń' | 'ņ' | 'ň' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ŏ' | 'ő' => 'o',
        'ŕ' | 'ŗ' | 'ř' => 'r',
        'ś' | 'ŝ' | 'ş' | 'š' => 's',
        'ţ' | 'ť' | 'ŧ' => 't',
        'ù' | 'ú' | 'û' | 'ü' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' => 'u',
        'ŵ' => 'w',
        'ý' | 'ÿ' | 'ŷ' => 'y',
        'ź' | 'ż' | 'ž' => 'z',
        other => other,
    }
}

/// Matches hypothesis text against the configured wake phrase variants
///
/// A hypothesis matches when any normalized variant occurs as a contiguous
/// substring of the normalized hypothesis, so a phrase embedded in a longer
/// utterance still triggers.
#[derive(Debug, Clone)]
pub struct WakeMatcher {
    variants: Vec<String>,
}

impl WakeMatcher {
    /// Build a matcher from phrase variants
    ///
    /// Variants are normalized and trimmed; blank variants are dropped.
    #[must_use]
    pub fn new<I, S>(variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for variant in variants {
            let v = normalize(variant.as_ref().trim());
            if !v.is_empty() && !normalized.contains(&v) {
                normalized.push(v);
            }
        }

        tracing::debug!(variants = ?normalized, "wake matcher initialized");

        Self {
            variants: normalized,
        }
    }

    /// Whether `text` contains any variant
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        self.matched_variant(text).is_some()
    }

    /// The first variant contained in `text`
    #[must_use]
    pub fn matched_variant(&self, text: &str) -> Option<&str> {
        if text.is_empty() {
            return None;
        }
        let normalized = normalize(text);
        self.variants
            .iter()
            .find(|v| normalized.contains(v.as_str()))
            .map(String::as_str)
    }

    /// The normalized variants
    #[must_use]
    pub fn variants(&self) -> &[String] {
        &self.variants
    }
}
