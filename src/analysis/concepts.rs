use once_cell::sync::Lazy;
use regex::Regex;

use super::stopwords::StopWordFilter;
use super::style::PromptStyle;
use super::dedup_in_order;

/// Default upper bound on words kept in one NLP concept.
pub const DEFAULT_MAX_CONCEPT_WORDS: usize = 4;

/// `<lora:name:0.8>`, `<hypernet:x:1>`, `<embedding>` invocations.
static NETWORK_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^<>]*>").expect("network tag regex is valid"));

/// Trailing attention weight such as `:1.2`, `: 0.5` or `:-1`.
static WEIGHT_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*:\s*-?(?:\d+\.?\d*|\.\d+)\s*$").expect("weight suffix regex is valid"));

const EMPHASIS_BRACKETS: &[char] = &['(', ')', '[', ']', '{', '}'];

// Escaped brackets are literal text (`nahida \(genshin impact\)`); park them while
// emphasis brackets are stripped.
const ESCAPED_OPEN: char = '\u{1}';
const ESCAPED_CLOSE: char = '\u{2}';

/// Remove LoRA/embedding invocations; they are resources, not subject matter.
pub fn strip_network_tags(prompt: &str) -> String {
    NETWORK_TAG_RE.replace_all(prompt, " ").into_owned()
}

/// Normalise one comma-delimited tag: drop emphasis brackets and the weight
/// suffix, collapse whitespace and lowercase. May return an empty string.
pub fn normalize_tag(segment: &str) -> String {
    let parked = segment
        .replace("\\(", &ESCAPED_OPEN.to_string())
        .replace("\\)", &ESCAPED_CLOSE.to_string());

    let trimmed = trim_emphasis(&parked);
    let unweighted = WEIGHT_SUFFIX_RE.replace(trimmed, "");
    let inner = trim_emphasis(&unweighted);

    inner
        .replace(ESCAPED_OPEN, "(")
        .replace(ESCAPED_CLOSE, ")")
        .replace('\\', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn trim_emphasis(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_whitespace() || EMPHASIS_BRACKETS.contains(&c))
}

/// Comma-delimited tag segments, normalised, empties dropped.
pub fn tag_segments(prompt: &str) -> Vec<String> {
    strip_network_tags(prompt)
        .split(',')
        .map(normalize_tag)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Sentence, then comma, segmentation of a tag list, each piece normalised
/// like a tag. Used for phrases, where a sentence break inside a tag list is
/// still a boundary.
pub fn tag_phrase_segments(prompt: &str) -> Vec<String> {
    let stripped = strip_network_tags(prompt);
    split_sentences(&stripped)
        .into_iter()
        .flat_map(|sentence| sentence.split(','))
        .map(normalize_tag)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Split on `.`, `!` and `?`. A `.` between two digits (`1.5`) is not a break.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut sentences = Vec::new();
    let mut start = 0;

    for (pos, &(idx, c)) in chars.iter().enumerate() {
        let is_break = match c {
            '!' | '?' => true,
            '.' => {
                let prev_digit = pos > 0 && chars[pos - 1].1.is_ascii_digit();
                let next_digit = chars.get(pos + 1).is_some_and(|(_, n)| n.is_ascii_digit());
                !(prev_digit && next_digit)
            }
            _ => false,
        };
        if is_break {
            sentences.push(&text[start..idx]);
            start = idx + c.len_utf8();
        }
    }
    sentences.push(&text[start..]);

    sentences.into_iter().filter(|s| !s.trim().is_empty()).collect()
}

/// Sentence, then comma, segmentation used for natural-language prompts.
pub fn nlp_segments(prompt: &str) -> Vec<String> {
    split_sentences(prompt)
        .into_iter()
        .flat_map(|sentence| sentence.split(','))
        .map(|clause| clause.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|clause| !clause.is_empty())
        .collect()
}

/// Lowercase whitespace tokens with surrounding punctuation trimmed.
pub fn tokenize(segment: &str) -> Vec<String> {
    segment
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| {
                matches!(c, '.' | ',' | '!' | '?' | ';' | ':' | '"' | '\'' | '`' | '(' | ')' | '[' | ']' | '{' | '}' | '<' | '>')
            })
            .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// Turns one prompt into its distinct concepts.
#[derive(Debug, Clone)]
pub struct ConceptExtractor<'a> {
    filter: &'a StopWordFilter,
    max_words: usize,
}

impl<'a> ConceptExtractor<'a> {
    pub fn new(filter: &'a StopWordFilter, max_words: usize) -> Self {
        Self {
            filter,
            max_words: max_words.max(1),
        }
    }

    /// Distinct concepts in first-seen order.
    pub fn extract(&self, prompt: &str, style: PromptStyle) -> Vec<String> {
        if prompt.trim().is_empty() {
            return Vec::new();
        }

        let concepts = match style {
            PromptStyle::TagStyle => tag_segments(prompt),
            PromptStyle::NlpStyle => self.nlp_concepts(prompt),
        };

        dedup_in_order(concepts)
    }

    fn nlp_concepts(&self, prompt: &str) -> Vec<String> {
        nlp_segments(prompt)
            .iter()
            .filter_map(|segment| {
                let tokens = tokenize(segment);
                let kept = self.filter.filter_meaningful(&tokens, PromptStyle::NlpStyle);
                if kept.is_empty() {
                    return None;
                }
                Some(kept.into_iter().take(self.max_words).collect::<Vec<_>>().join(" "))
            })
            .collect()
    }
}

/// Extract concepts with the built-in stop-word lists and default width.
pub fn extract_concepts(prompt: &str, style: PromptStyle) -> Vec<String> {
    let filter = StopWordFilter::new();
    ConceptExtractor::new(&filter, DEFAULT_MAX_CONCEPT_WORDS).extract(prompt, style)
}
