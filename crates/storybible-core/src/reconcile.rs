use regex::Regex;
use serde::Serialize;

use super::directive::Command;
use super::error::ConfigError;
use super::state::Field;

/// Built-in commitment phrases. Each must expose a `field` capture group.
pub const DEFAULT_PATTERNS: &[&str] = &[
    // "I'll track that as our theme", "let me lock the title in"
    r"(?i)\b(?:i['’]ll|i will|i['’]m going to|i am going to|let me|i['’]ve|i have|i just)\s+(?:go ahead and\s+)?(?:track(?:ed)?|save[d]?|lock(?:ed)?|store[d]?|log(?:ged)?|record(?:ed)?|add(?:ed)?|jot(?:ted)?|capture[d]?|pin(?:ned)?|set)\b[^.!?\n]{0,60}?\b(?P<field>title|logline|theme|tone|comps|comparables|characters?|beats?|outline|scenes?|notebook)\b",
    // "Title locked: ...", "theme is now set"
    r"(?i)\b(?P<field>title|logline|theme|tone|comps)\s+(?:is\s+)?(?:now\s+)?(?:officially\s+)?(?:locked|saved|set|tracked|stored)\b",
    // "added that to the notebook", "saved it in your outline"
    r"(?i)\b(?:added|saved|tracked|jotted|noted|logged)\s+(?:that\s+|this\s+|it\s+)?(?:down\s+)?(?:to|in|into)\s+(?:the\s+|your\s+|our\s+)?(?P<field>notebook|notes|outline|beats|scenes|characters)\b",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationWarning {
    pub field: Field,
    /// The sentence fragment that claimed the save.
    pub phrase: String,
    /// Byte offset of the phrase in the sanitized text.
    pub offset: usize,
}

/// Detects narrated saves that have no matching executed directive. It only
/// reports; it never guesses a value from prose.
#[derive(Debug, Clone)]
pub struct Reconciler {
    patterns: Vec<Regex>,
}

impl Reconciler {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ConfigError> {
        let compiled = patterns
            .iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                let regex = Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                })?;
                if !regex.capture_names().flatten().any(|name| name == "field") {
                    return Err(ConfigError::MissingFieldGroup(pattern.to_string()));
                }
                Ok(regex)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns: compiled })
    }

    pub fn with_defaults() -> Result<Self, ConfigError> {
        Self::new(DEFAULT_PATTERNS)
    }

    pub fn check(&self, sanitized: &str, executed: &[Command]) -> Vec<ReconciliationWarning> {
        let mut warnings: Vec<ReconciliationWarning> = Vec::new();

        for (start, sentence) in sentences(sanitized) {
            // Questions ("Should I lock the title?") are offers, not claims.
            if sentence.trim_end().ends_with('?') {
                continue;
            }
            for pattern in &self.patterns {
                for captures in pattern.captures_iter(sentence) {
                    let Some(field) = captures
                        .name("field")
                        .and_then(|m| field_for_keyword(m.as_str()))
                    else {
                        continue;
                    };
                    if executed.iter().any(|command| command.field() == field)
                        || warnings.iter().any(|warning| warning.field == field)
                    {
                        continue;
                    }
                    let Some(whole) = captures.get(0) else {
                        continue;
                    };
                    warnings.push(ReconciliationWarning {
                        field,
                        phrase: whole.as_str().to_string(),
                        offset: start + whole.start(),
                    });
                }
            }
        }

        warnings.sort_by_key(|warning| warning.offset);
        warnings
    }
}

fn field_for_keyword(keyword: &str) -> Option<Field> {
    match keyword.to_ascii_lowercase().as_str() {
        "title" => Some(Field::Title),
        "logline" => Some(Field::Logline),
        "theme" => Some(Field::Theme),
        "tone" => Some(Field::Tone),
        "comps" | "comparables" => Some(Field::Comps),
        "character" | "characters" => Some(Field::Characters),
        "beat" | "beats" | "outline" => Some(Field::Beats),
        "scene" | "scenes" => Some(Field::Scenes),
        "notebook" | "notes" => Some(Field::Notebook),
        _ => None,
    }
}

/// Splits on sentence punctuation and newlines, keeping the terminator with
/// its sentence. Yields `(byte_offset, sentence)`.
fn sentences(text: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start = 0;
    for (idx, ch) in text.char_indices() {
        if matches!(ch, '.' | '!' | '?' | '\n') {
            let end = idx + ch.len_utf8();
            if !text[start..end].trim().is_empty() {
                out.push((start, &text[start..end]));
            }
            start = end;
        }
    }
    if !text[start..].trim().is_empty() {
        out.push((start, &text[start..]));
    }
    out
}
