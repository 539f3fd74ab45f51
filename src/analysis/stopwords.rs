use once_cell::sync::Lazy;
use std::collections::HashSet;

use super::style::PromptStyle;

/// High-frequency, low-information English words dropped from both prompt styles.
const BASE_STOP_WORDS: &[&str] = &[
    // articles and determiners
    "a", "an", "the", "this", "that", "these", "those", "some", "any", "each", "every",
    "either", "neither", "another", "such",
    // conjunctions
    "and", "or", "but", "nor", "so", "yet", "if", "then", "than", "because", "since",
    "although", "though", "unless", "until", "while", "whereas", "whether",
    // prepositions
    "in", "on", "at", "to", "for", "from", "with", "without", "by", "as", "of", "into",
    "onto", "upon", "over", "under", "through", "during", "before", "after", "about",
    "above", "below", "between", "among", "around", "behind", "beside", "across",
    "against", "along", "within", "toward", "towards", "via", "off", "up", "down", "out",
    // pronouns and possessives
    "it", "its", "his", "her", "hers", "their", "theirs", "our", "ours", "my", "mine",
    "your", "yours", "he", "she", "they", "them", "him", "me", "us", "we", "you", "i",
    "itself", "herself", "himself", "themselves",
    // auxiliaries
    "is", "are", "was", "were", "be", "been", "being", "am", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "must",
    "can", "shall",
    // question words
    "when", "where", "why", "how", "what", "which", "who", "whose", "whom",
    // intensifiers and vague modifiers
    "also", "very", "too", "quite", "rather", "just", "only", "even", "still",
    "already", "really", "extremely", "somewhat", "many", "few", "most", "much",
    "little", "more", "less", "there", "here",
];

/// Quality boilerplate. In tag prompts these are deliberate quality markers and
/// are kept; in natural-language prompts they carry no subject matter.
const QUALITY_META_WORDS: &[&str] = &[
    "masterpiece",
    "best quality",
    "high quality",
    "highest quality",
    "top quality",
    "amazing quality",
    "very aesthetic",
    "ultra detailed",
    "highly detailed",
    "extremely detailed",
    "highres",
    "absurdres",
    "hires",
    "4k",
    "8k",
    "uhd",
    "hdr",
    "score_9",
    "score_8_up",
    "score_7_up",
];

static BASE_SET: Lazy<HashSet<&'static str>> = Lazy::new(|| BASE_STOP_WORDS.iter().copied().collect());

static QUALITY_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| QUALITY_META_WORDS.iter().copied().collect());

/// Case-insensitive membership test against the built-in stop-word list.
pub fn is_stop_word(token: &str) -> bool {
    BASE_SET.contains(token.to_lowercase().as_str())
}

/// Case-insensitive membership test against the built-in quality meta-word list.
/// Multi-word entries match when passed joined by a single space.
pub fn is_quality_word(token: &str) -> bool {
    QUALITY_SET.contains(token.to_lowercase().as_str())
}

/// Stop-word filter with optional user additions on top of the built-in lists.
#[derive(Debug, Clone, Default)]
pub struct StopWordFilter {
    extra_stop_words: HashSet<String>,
    extra_quality_words: HashSet<String>,
}

impl StopWordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extras<S: AsRef<str>>(stop_words: &[S], quality_words: &[S]) -> Self {
        Self {
            extra_stop_words: stop_words
                .iter()
                .map(|w| w.as_ref().trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
            extra_quality_words: quality_words
                .iter()
                .map(|w| normalize_spaces(&w.as_ref().to_lowercase()))
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    pub fn is_stop_word(&self, token: &str) -> bool {
        let lower = token.to_lowercase();
        BASE_SET.contains(lower.as_str()) || self.extra_stop_words.contains(&lower)
    }

    pub fn is_quality_word(&self, token: &str) -> bool {
        let lower = token.to_lowercase();
        QUALITY_SET.contains(lower.as_str()) || self.extra_quality_words.contains(&lower)
    }

    /// Remove stop words from a token sequence, preserving order.
    ///
    /// Quality meta-words (single tokens and two-token pairs such as
    /// `best quality`) are removed only for [`PromptStyle::NlpStyle`].
    pub fn filter_meaningful<S: AsRef<str>>(&self, tokens: &[S], style: PromptStyle) -> Vec<String> {
        self.keep_mask(tokens, style)
            .into_iter()
            .zip(tokens)
            .filter(|(keep, _)| *keep)
            .map(|(_, t)| t.as_ref().to_string())
            .collect()
    }

    /// Per-token keep/drop decision. Exposed to the phrase extractor, which needs
    /// to know where the dropped words were, not only what survived.
    pub(crate) fn keep_mask<S: AsRef<str>>(&self, tokens: &[S], style: PromptStyle) -> Vec<bool> {
        let mut keep = vec![true; tokens.len()];
        let strip_quality = style == PromptStyle::NlpStyle;

        let mut i = 0;
        while i < tokens.len() {
            let token = tokens[i].as_ref();
            if strip_quality && i + 1 < tokens.len() {
                let pair = format!("{} {}", token, tokens[i + 1].as_ref());
                if self.is_quality_word(&pair) {
                    keep[i] = false;
                    keep[i + 1] = false;
                    i += 2;
                    continue;
                }
            }
            if token.is_empty() || self.is_stop_word(token) || (strip_quality && self.is_quality_word(token)) {
                keep[i] = false;
            }
            i += 1;
        }

        keep
    }
}

fn normalize_spaces(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<String> {
        s.split_whitespace().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_base_list_is_large_enough() {
        assert!(BASE_STOP_WORDS.len() >= 100);
        // no accidental duplicates
        assert_eq!(BASE_SET.len(), BASE_STOP_WORDS.len());
    }

    #[test]
    fn test_is_stop_word_case_insensitive() {
        assert!(is_stop_word("the"));
        assert!(is_stop_word("The"));
        assert!(is_stop_word("WITH"));
        assert!(!is_stop_word("woman"));
        assert!(!is_stop_word("masterpiece"));
        assert!(!is_stop_word(""));
    }

    #[test]
    fn test_quality_words_are_separate_list() {
        assert!(is_quality_word("masterpiece"));
        assert!(is_quality_word("Best Quality"));
        assert!(!is_quality_word("best"));
    }

    #[test]
    fn test_filter_keeps_quality_words_for_tags() {
        let filter = StopWordFilter::new();
        let kept = filter.filter_meaningful(&toks("masterpiece of the best quality"), PromptStyle::TagStyle);
        assert_eq!(kept, vec!["masterpiece", "best", "quality"]);
    }

    #[test]
    fn test_filter_drops_quality_words_for_nlp() {
        let filter = StopWordFilter::new();
        let kept = filter.filter_meaningful(
            &toks("masterpiece, a woman in best quality light"),
            PromptStyle::NlpStyle,
        );
        // "masterpiece," keeps its comma here because tokens are taken verbatim
        assert_eq!(kept, vec!["masterpiece,", "woman", "light"]);

        let kept = filter.filter_meaningful(&toks("masterpiece woman high quality"), PromptStyle::NlpStyle);
        assert_eq!(kept, vec!["woman"]);
    }

    #[test]
    fn test_extra_words_from_config() {
        let filter = StopWordFilter::with_extras(&["Wearing"], &["Award  Winning"]);
        assert!(filter.is_stop_word("wearing"));
        assert!(filter.is_quality_word("award winning"));
        let kept = filter.filter_meaningful(&toks("girl wearing award winning dress"), PromptStyle::NlpStyle);
        assert_eq!(kept, vec!["girl", "dress"]);
    }

    #[test]
    fn test_filter_empty_input() {
        let filter = StopWordFilter::new();
        let empty: Vec<String> = Vec::new();
        assert!(filter.filter_meaningful(&empty, PromptStyle::NlpStyle).is_empty());
    }
}
