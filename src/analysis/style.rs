use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Comma density at or above which a prompt is treated as a tag list.
pub const DEFAULT_COMMA_DENSITY_THRESHOLD: f64 = 0.3;

/// A bracketed segment carrying `identifier:number`, e.g. `<lora:name:0.5>` or `(red hair:1.2)`.
static BRACKET_WEIGHT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[<(\[][^<>()\[\]]*[\w\s]:\s*-?\d+(?:\.\d+)?\s*[>)\]]").expect("bracket weight regex is valid")
});

/// How a prompt was authored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PromptStyle {
    /// Danbooru-style comma-separated keyword list.
    #[serde(rename = "tag")]
    TagStyle,
    /// Natural-language sentences.
    #[serde(rename = "nlp")]
    NlpStyle,
}

impl PromptStyle {
    pub fn as_str(&self) -> &str {
        match self {
            PromptStyle::TagStyle => "tag",
            PromptStyle::NlpStyle => "nlp",
        }
    }
}

impl fmt::Display for PromptStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PromptStyle {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "tag" | "tags" | "tag-style" => Ok(PromptStyle::TagStyle),
            "nlp" | "natural" | "nlp-style" => Ok(PromptStyle::NlpStyle),
            _ => anyhow::bail!("Unknown prompt style: {}", s),
        }
    }
}

pub fn is_blank(prompt: &str) -> bool {
    prompt.trim().is_empty()
}

pub fn comma_count(prompt: &str) -> usize {
    prompt.matches(',').count()
}

pub fn word_count(prompt: &str) -> usize {
    prompt.split_whitespace().count()
}

/// Commas per whitespace-delimited word. Zero-word prompts divide by one.
pub fn comma_density(prompt: &str) -> f64 {
    comma_count(prompt) as f64 / word_count(prompt).max(1) as f64
}

pub fn has_bracket_weight(prompt: &str) -> bool {
    BRACKET_WEIGHT_RE.is_match(prompt)
}

/// Decides prompt style from comma density and weight syntax.
#[derive(Debug, Clone, Copy)]
pub struct StyleClassifier {
    threshold: f64,
}

impl Default for StyleClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_COMMA_DENSITY_THRESHOLD)
    }
}

impl StyleClassifier {
    pub fn new(threshold: f64) -> Self {
        // NaN would make every comparison false and silently force NLP style
        let threshold = if threshold.is_finite() {
            threshold
        } else {
            DEFAULT_COMMA_DENSITY_THRESHOLD
        };
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Classify a prompt. Blank prompts are tag-style (they yield nothing
    /// downstream either way). A density exactly at the threshold is tag-style.
    pub fn classify(&self, prompt: &str) -> PromptStyle {
        if is_blank(prompt) {
            return PromptStyle::TagStyle;
        }
        if has_bracket_weight(prompt) || comma_density(prompt) >= self.threshold {
            return PromptStyle::TagStyle;
        }
        PromptStyle::NlpStyle
    }
}

/// Classify with the default threshold.
pub fn classify(prompt: &str) -> PromptStyle {
    StyleClassifier::default().classify(prompt)
}
