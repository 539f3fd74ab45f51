use super::concepts::{nlp_segments, tag_phrase_segments, tokenize};
use super::dedup_in_order;
use super::stopwords::StopWordFilter;
use super::style::PromptStyle;

pub const DEFAULT_MIN_PHRASE_WORDS: usize = 2;
pub const DEFAULT_MAX_PHRASE_WORDS: usize = 4;

/// Extracts multi-word phrases bounded by natural delimiters.
///
/// Each comma/sentence segment yields at most one phrase. Only when a segment is
/// wider than the maximum is it re-cut, and then only where its own stop words
/// sit, so a phrase never overlaps another phrase from the same segment.
#[derive(Debug, Clone)]
pub struct PhraseExtractor<'a> {
    filter: &'a StopWordFilter,
    min_words: usize,
    max_words: usize,
}

impl<'a> PhraseExtractor<'a> {
    pub fn new(filter: &'a StopWordFilter, min_words: usize, max_words: usize) -> Self {
        let min_words = min_words.max(1);
        Self {
            filter,
            min_words,
            max_words: max_words.max(min_words),
        }
    }

    /// Distinct phrases in first-seen order.
    pub fn extract(&self, prompt: &str, style: PromptStyle) -> Vec<String> {
        if prompt.trim().is_empty() {
            return Vec::new();
        }

        let segments = match style {
            PromptStyle::TagStyle => tag_phrase_segments(prompt),
            PromptStyle::NlpStyle => nlp_segments(prompt),
        };

        let phrases = segments
            .iter()
            .flat_map(|segment| self.segment_phrases(segment, style))
            .collect();

        dedup_in_order(phrases)
    }

    fn segment_phrases(&self, segment: &str, style: PromptStyle) -> Vec<String> {
        let tokens = tokenize(segment);
        let keep = self.filter.keep_mask(&tokens, style);
        let content: Vec<&str> = tokens
            .iter()
            .zip(&keep)
            .filter(|(_, k)| **k)
            .map(|(t, _)| t.as_str())
            .collect();

        if content.len() <= self.max_words {
            return self.accept(&content).into_iter().collect();
        }

        // Too wide: maximal runs of content words between dropped words.
        let mut phrases = Vec::new();
        let mut run: Vec<&str> = Vec::new();
        for (token, kept) in tokens.iter().zip(&keep) {
            if *kept {
                run.push(token);
            } else if !run.is_empty() {
                phrases.extend(self.accept(&run));
                run.clear();
            }
        }
        phrases.extend(self.accept(&run));
        phrases
    }

    fn accept(&self, words: &[&str]) -> Option<String> {
        let words = &words[..words.len().min(self.max_words)];
        if words.len() < self.min_words {
            return None;
        }
        Some(words.join(" "))
    }
}

/// Extract phrases with the built-in stop-word lists and default widths.
pub fn extract_phrases(prompt: &str, style: PromptStyle) -> Vec<String> {
    let filter = StopWordFilter::new();
    PhraseExtractor::new(&filter, DEFAULT_MIN_PHRASE_WORDS, DEFAULT_MAX_PHRASE_WORDS).extract(prompt, style)
}
