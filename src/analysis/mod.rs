//! Prompt analysis: style detection, concept and phrase extraction, and
//! collection-wide frequency statistics.
//!
//! Everything in this module is synchronous, performs no I/O and never fails on
//! prompt content. A missing or malformed prompt is just an empty string here.

pub mod aggregator;
pub mod concepts;
pub mod phrases;
pub mod report;
pub mod stopwords;
pub mod style;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub use aggregator::{AggregateState, FrequencyAggregator, FrequencyTable, LoraStats, StyleTally};
pub use concepts::{extract_concepts, ConceptExtractor};
pub use phrases::{extract_phrases, PhraseExtractor};
pub use report::{top_n, AnalysisReport, LoraEntry, RankedEntry, ReportBuilder, ReportLimits, SamplePrompt, StyleBreakdown};
pub use stopwords::{is_stop_word, StopWordFilter};
pub use style::{classify, PromptStyle, StyleClassifier};

/// Tunable heuristics. The defaults are empirically chosen, not contractual.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisSettings {
    pub comma_density_threshold: f64,
    pub max_concept_words: usize,
    pub min_phrase_words: usize,
    pub max_phrase_words: usize,
    pub extra_stop_words: Vec<String>,
    pub extra_quality_words: Vec<String>,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            comma_density_threshold: style::DEFAULT_COMMA_DENSITY_THRESHOLD,
            max_concept_words: concepts::DEFAULT_MAX_CONCEPT_WORDS,
            min_phrase_words: phrases::DEFAULT_MIN_PHRASE_WORDS,
            max_phrase_words: phrases::DEFAULT_MAX_PHRASE_WORDS,
            extra_stop_words: Vec::new(),
            extra_quality_words: Vec::new(),
        }
    }
}

/// Style, concepts and phrases of one prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptBreakdown {
    pub style: PromptStyle,
    pub concepts: Vec<String>,
    pub phrases: Vec<String>,
}

/// Configured entry point to the per-prompt heuristics.
#[derive(Debug, Clone)]
pub struct PromptAnalyzer {
    settings: AnalysisSettings,
    classifier: StyleClassifier,
    filter: StopWordFilter,
}

impl Default for PromptAnalyzer {
    fn default() -> Self {
        Self::new(AnalysisSettings::default())
    }
}

impl PromptAnalyzer {
    pub fn new(settings: AnalysisSettings) -> Self {
        let classifier = StyleClassifier::new(settings.comma_density_threshold);
        let filter = StopWordFilter::with_extras(
            settings.extra_stop_words.as_slice(),
            settings.extra_quality_words.as_slice(),
        );
        Self {
            settings,
            classifier,
            filter,
        }
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    pub fn classify(&self, prompt: &str) -> PromptStyle {
        self.classifier.classify(prompt)
    }

    pub fn extract_concepts(&self, prompt: &str, style: PromptStyle) -> Vec<String> {
        ConceptExtractor::new(&self.filter, self.settings.max_concept_words).extract(prompt, style)
    }

    pub fn extract_phrases(&self, prompt: &str, style: PromptStyle) -> Vec<String> {
        PhraseExtractor::new(
            &self.filter,
            self.settings.min_phrase_words,
            self.settings.max_phrase_words,
        )
        .extract(prompt, style)
    }

    /// Classify once and run both extractors with that style.
    pub fn breakdown(&self, prompt: &str) -> PromptBreakdown {
        let style = self.classify(prompt);
        PromptBreakdown {
            style,
            concepts: self.extract_concepts(prompt, style),
            phrases: self.extract_phrases(prompt, style),
        }
    }
}

/// Drop repeats, keeping the first occurrence of each item.
pub(crate) fn dedup_in_order(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(items.len());
    items.into_iter().filter(|item| seen.insert(item.clone())).collect()
}
