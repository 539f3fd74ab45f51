use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::style::PromptStyle;
use super::PromptAnalyzer;
use crate::civitai::records::ImageRecord;

/// Counter that remembers first-seen order, used as the tie-break when ranking.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrequencyTable {
    entries: Vec<(String, usize)>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl FrequencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, key: &str) {
        self.add(key, 1);
    }

    pub fn add(&mut self, key: &str, amount: usize) {
        match self.index.get(key) {
            Some(&pos) => self.entries[pos].1 += amount,
            None => {
                self.index.insert(key.to_string(), self.entries.len());
                self.entries.push((key.to_string(), amount));
            }
        }
    }

    pub fn get(&self, key: &str) -> usize {
        self.index.get(key).map(|&pos| self.entries[pos].1).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.entries.iter().map(|(k, c)| (k.as_str(), *c))
    }
}

/// Usage of one LoRA across the collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoraStats {
    pub usage_count: usize,
    pub weight_sum: f64,
    pub model_id: Option<u64>,
    pub model_version_id: Option<u64>,
}

impl LoraStats {
    pub fn average_weight(&self) -> f64 {
        if self.usage_count == 0 {
            return 0.0;
        }
        self.weight_sum / self.usage_count as f64
    }
}

/// Tag vs natural-language prompt counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleTally {
    pub tag: usize,
    pub nlp: usize,
}

impl StyleTally {
    fn record(&mut self, style: PromptStyle) {
        match style {
            PromptStyle::TagStyle => self.tag += 1,
            PromptStyle::NlpStyle => self.nlp += 1,
        }
    }
}

/// Everything counted over one collection. Produced once by
/// [`FrequencyAggregator::finalize`] and only read afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateState {
    pub total_images: usize,
    pub positive_concepts: FrequencyTable,
    pub negative_concepts: FrequencyTable,
    pub positive_phrases: FrequencyTable,
    pub negative_phrases: FrequencyTable,
    pub models: FrequencyTable,
    pub model_versions: FrequencyTable,
    pub samplers: FrequencyTable,
    pub steps: FrequencyTable,
    pub cfg_scales: FrequencyTable,
    pub tags: FrequencyTable,
    pub authors: FrequencyTable,
    /// LoRA name to stats, with first-seen order in `lora_order`.
    pub loras: HashMap<String, LoraStats>,
    pub lora_order: Vec<String>,
    pub positive_styles: StyleTally,
    pub negative_styles: StyleTally,
}

impl AggregateState {
    /// Fold a whole collection in one pass.
    pub fn from_records<'r, I>(records: I, analyzer: &PromptAnalyzer) -> Self
    where
        I: IntoIterator<Item = &'r ImageRecord>,
    {
        let mut aggregator = FrequencyAggregator::new(analyzer);
        for record in records {
            aggregator.add_image(record);
        }
        aggregator.finalize()
    }

    /// LoRA stats in first-seen order.
    pub fn loras_in_order(&self) -> impl Iterator<Item = (&str, &LoraStats)> {
        self.lora_order
            .iter()
            .filter_map(|name| self.loras.get(name).map(|stats| (name.as_str(), stats)))
    }
}

/// Single forward pass over image records.
pub struct FrequencyAggregator<'a> {
    analyzer: &'a PromptAnalyzer,
    state: AggregateState,
}

impl<'a> FrequencyAggregator<'a> {
    pub fn new(analyzer: &'a PromptAnalyzer) -> Self {
        Self {
            analyzer,
            state: AggregateState::default(),
        }
    }

    pub fn images_seen(&self) -> usize {
        self.state.total_images
    }

    pub fn add_image(&mut self, record: &ImageRecord) {
        let state = &mut self.state;
        state.total_images += 1;

        let positive = self.analyzer.breakdown(&record.prompt);
        state.positive_styles.record(positive.style);
        count_each(&mut state.positive_concepts, &positive.concepts);
        count_each(&mut state.positive_phrases, &positive.phrases);

        let negative = self.analyzer.breakdown(&record.negative_prompt);
        state.negative_styles.record(negative.style);
        count_each(&mut state.negative_concepts, &negative.concepts);
        count_each(&mut state.negative_phrases, &negative.phrases);

        let model = non_empty(record.model.as_deref());
        if let Some(model) = model {
            state.models.increment(model);
        }
        if let Some(version) = non_empty(record.model_version.as_deref()) {
            let label = format!("{} - {}", model.unwrap_or("Unknown"), version);
            state.model_versions.increment(&label);
        }
        if let Some(sampler) = non_empty(record.sampler.as_deref()) {
            state.samplers.increment(sampler);
        }
        if let Some(steps) = record.steps {
            state.steps.increment(&steps.to_string());
        }
        if let Some(cfg) = record.cfg_scale.filter(|c| c.is_finite()) {
            state.cfg_scales.increment(&format_cfg(cfg));
        }
        if let Some(author) = non_empty(record.author.as_deref()) {
            state.authors.increment(author);
        }

        // Every listed instance counts, even a repeat on the same image.
        for lora in &record.loras {
            let name = lora.name.trim();
            if name.is_empty() {
                continue;
            }
            if !state.loras.contains_key(name) {
                state.lora_order.push(name.to_string());
            }
            let stats = state.loras.entry(name.to_string()).or_default();
            stats.usage_count += 1;
            stats.weight_sum += lora.weight;
            stats.model_id = stats.model_id.or(lora.model_id);
            stats.model_version_id = stats.model_version_id.or(lora.model_version_id);
        }

        let mut seen_tags = HashSet::new();
        for tag in &record.tags {
            let tag = tag.trim();
            if !tag.is_empty() && seen_tags.insert(tag) {
                state.tags.increment(tag);
            }
        }
    }

    pub fn finalize(self) -> AggregateState {
        self.state
    }
}

fn count_each(table: &mut FrequencyTable, items: &[String]) {
    for item in items {
        table.increment(item);
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// `7.0` -> `"7"`, `5.5` -> `"5.5"`.
fn format_cfg(cfg: f64) -> String {
    if cfg.fract() == 0.0 {
        format!("{}", cfg as i64)
    } else {
        format!("{}", cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::civitai::records::LoraUsage;

    fn record(id: u64, prompt: &str) -> ImageRecord {
        ImageRecord {
            prompt: prompt.to_string(),
            ..ImageRecord::new(id)
        }
    }

    #[test]
    fn test_frequency_table_keeps_first_seen_order() {
        let mut table = FrequencyTable::new();
        table.increment("b");
        table.increment("a");
        table.increment("b");
        table.add("c", 3);
        assert_eq!(table.get("b"), 2);
        assert_eq!(table.get("missing"), 0);
        let keys: Vec<_> = table.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_concept_counted_once_per_image() {
        let analyzer = PromptAnalyzer::default();
        let records = vec![record(1, "1girl, 1girl, solo"), record(2, "1girl, smile")];
        let state = AggregateState::from_records(&records, &analyzer);
        assert_eq!(state.total_images, 2);
        assert_eq!(state.positive_concepts.get("1girl"), 2);
        assert_eq!(state.positive_concepts.get("solo"), 1);
    }

    #[test]
    fn test_lora_average_weight_and_first_ids() {
        let analyzer = PromptAnalyzer::default();
        let mut a = record(1, "");
        a.loras = vec![LoraUsage {
            model_id: Some(5),
            model_version_id: Some(6),
            ..LoraUsage::new("detail", 0.6)
        }];
        let mut b = record(2, "");
        b.loras = vec![LoraUsage {
            model_id: Some(99),
            ..LoraUsage::new("detail", 0.8)
        }];
        let state = AggregateState::from_records(&[a, b], &analyzer);

        let stats = &state.loras["detail"];
        assert_eq!(stats.usage_count, 2);
        assert!((stats.average_weight() - 0.7).abs() < 1e-9);
        assert_eq!(stats.model_id, Some(5));
        assert_eq!(stats.model_version_id, Some(6));
    }

    #[test]
    fn test_lora_repeated_on_one_image_counts_each_instance() {
        let analyzer = PromptAnalyzer::default();
        let mut image = record(1, "");
        image.loras = vec![
            LoraUsage {
                model_id: Some(7),
                ..LoraUsage::new("X", 0.5)
            },
            LoraUsage {
                model_id: Some(8),
                model_version_id: Some(9),
                ..LoraUsage::new("X", 1.5)
            },
        ];
        let state = AggregateState::from_records(&[image], &analyzer);

        let stats = &state.loras["X"];
        assert_eq!(stats.usage_count, 2);
        assert!((stats.average_weight() - 1.0).abs() < 1e-9);
        assert_eq!(stats.model_id, Some(7));
        assert_eq!(stats.model_version_id, Some(9));
        assert_eq!(state.lora_order, vec!["X"]);

        let report = crate::analysis::ReportBuilder::new(&state).build();
        assert_eq!(report.top_loras[0].usage_count, 2);
        assert!((report.top_loras[0].average_weight - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_structured_fields() {
        let analyzer = PromptAnalyzer::default();
        let image = ImageRecord {
            model: Some("Pony".into()),
            model_version: Some("V6".into()),
            sampler: Some("Euler a".into()),
            steps: Some(30),
            cfg_scale: Some(7.0),
            author: Some("  ".into()),
            tags: vec!["woman".into(), "woman".into(), "".into()],
            ..ImageRecord::new(1)
        };
        let mut half = ImageRecord::new(2);
        half.cfg_scale = Some(5.5);
        half.model_version = Some("X".into());

        let state = AggregateState::from_records(&[image, half], &analyzer);
        assert_eq!(state.models.get("Pony"), 1);
        assert_eq!(state.model_versions.get("Pony - V6"), 1);
        assert_eq!(state.model_versions.get("Unknown - X"), 1);
        assert_eq!(state.samplers.get("Euler a"), 1);
        assert_eq!(state.steps.get("30"), 1);
        assert_eq!(state.cfg_scales.get("7"), 1);
        assert_eq!(state.cfg_scales.get("5.5"), 1);
        assert!(state.authors.is_empty());
        assert_eq!(state.tags.get("woman"), 1);
        assert_eq!(state.tags.len(), 1);
    }

    #[test]
    fn test_style_tallies() {
        let analyzer = PromptAnalyzer::default();
        let mut a = record(1, "1girl, solo, smile");
        a.negative_prompt = "a blurry photo of something ugly".into();
        let b = record(2, "a cat sleeping on a warm windowsill");
        let state = AggregateState::from_records(&[a, b], &analyzer);
        assert_eq!(state.positive_styles, StyleTally { tag: 1, nlp: 1 });
        // empty negative prompt is tag-style and yields nothing
        assert_eq!(state.negative_styles, StyleTally { tag: 1, nlp: 1 });
    }

    #[test]
    fn test_incremental_matches_fold() {
        let analyzer = PromptAnalyzer::default();
        let records = crate::civitai::source::sample_records();

        let mut aggregator = FrequencyAggregator::new(&analyzer);
        for r in &records {
            aggregator.add_image(r);
        }
        assert_eq!(aggregator.images_seen(), records.len());
        assert_eq!(aggregator.finalize(), AggregateState::from_records(&records, &analyzer));
    }

    #[test]
    fn test_empty_collection() {
        let analyzer = PromptAnalyzer::default();
        let records: Vec<ImageRecord> = Vec::new();
        let state = AggregateState::from_records(&records, &analyzer);
        assert_eq!(state.total_images, 0);
        assert!(state.positive_concepts.is_empty());
        assert!(state.loras.is_empty());
    }
}
