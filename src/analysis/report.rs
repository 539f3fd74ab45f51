use serde::{Deserialize, Serialize};

use super::aggregator::{AggregateState, FrequencyTable, StyleTally};
use crate::civitai::records::ImageRecord;

/// One ranked key with its image count and share of the collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub key: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoraEntry {
    pub name: String,
    pub usage_count: usize,
    pub percentage: f64,
    pub average_weight: f64,
    pub model_id: Option<u64>,
    pub model_version_id: Option<u64>,
}

impl LoraEntry {
    /// Model page link, when the LoRA's model id is known.
    pub fn civitai_url(&self) -> Option<String> {
        let model_id = self.model_id?;
        Some(match self.model_version_id {
            Some(version) => format!("https://civitai.com/models/{}?modelVersionId={}", model_id, version),
            None => format!("https://civitai.com/models/{}", model_id),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleBreakdown {
    pub positive: StyleTally,
    pub negative: StyleTally,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplePrompt {
    pub image_id: u64,
    pub model: Option<String>,
    pub prompt: String,
}

/// How many entries each report section keeps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportLimits {
    pub models: usize,
    pub model_versions: usize,
    pub samplers: usize,
    pub steps: usize,
    pub cfg_scales: usize,
    pub loras: usize,
    pub tags: usize,
    pub authors: usize,
    pub positive_concepts: usize,
    pub negative_concepts: usize,
    pub positive_phrases: usize,
    pub negative_phrases: usize,
    pub sample_prompts: usize,
}

impl Default for ReportLimits {
    fn default() -> Self {
        Self {
            models: 10,
            model_versions: 8,
            samplers: 10,
            steps: 8,
            cfg_scales: 8,
            loras: 15,
            tags: 30,
            authors: 10,
            positive_concepts: 30,
            negative_concepts: 20,
            positive_phrases: 20,
            negative_phrases: 20,
            sample_prompts: 3,
        }
    }
}

/// Ranked views over one finished analysis pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub collection_id: Option<u64>,
    /// `None` when every image was requested.
    pub limit_applied: Option<usize>,
    pub total_images: usize,
    pub style_breakdown: StyleBreakdown,
    pub top_models: Vec<RankedEntry>,
    pub top_model_versions: Vec<RankedEntry>,
    pub top_samplers: Vec<RankedEntry>,
    pub top_steps: Vec<RankedEntry>,
    pub top_cfg_scales: Vec<RankedEntry>,
    pub top_loras: Vec<LoraEntry>,
    pub top_tags: Vec<RankedEntry>,
    pub top_authors: Vec<RankedEntry>,
    pub top_positive_concepts: Vec<RankedEntry>,
    pub top_negative_concepts: Vec<RankedEntry>,
    pub top_positive_phrases: Vec<RankedEntry>,
    pub top_negative_phrases: Vec<RankedEntry>,
    #[serde(default)]
    pub sample_prompts: Vec<SamplePrompt>,
}

/// Share of `total` as a percentage rounded to one decimal.
pub fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (count as f64 * 1000.0 / total as f64).round() / 10.0
}

/// The `n` most frequent keys, count descending. Equal counts keep first-seen
/// order. Empty when `total_images` is zero.
pub fn top_n(table: &FrequencyTable, n: usize, total_images: usize) -> Vec<RankedEntry> {
    if total_images == 0 {
        return Vec::new();
    }
    let mut entries: Vec<(&str, usize)> = table.iter().collect();
    // stable sort: ties stay in insertion order
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    entries
        .into_iter()
        .take(n)
        .map(|(key, count)| RankedEntry {
            key: key.to_string(),
            count,
            percentage: percentage(count, total_images),
        })
        .collect()
}

pub struct ReportBuilder<'a> {
    state: &'a AggregateState,
    limits: ReportLimits,
    collection_id: Option<u64>,
    limit_applied: Option<usize>,
    sample_prompts: Vec<SamplePrompt>,
}

impl<'a> ReportBuilder<'a> {
    pub fn new(state: &'a AggregateState) -> Self {
        Self {
            state,
            limits: ReportLimits::default(),
            collection_id: None,
            limit_applied: None,
            sample_prompts: Vec::new(),
        }
    }

    pub fn limits(mut self, limits: ReportLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn collection(mut self, collection_id: u64, limit_applied: Option<usize>) -> Self {
        self.collection_id = Some(collection_id);
        self.limit_applied = limit_applied;
        self
    }

    /// Keep the first few non-empty prompts as examples.
    pub fn samples_from(mut self, records: &[ImageRecord]) -> Self {
        self.sample_prompts = records
            .iter()
            .filter(|r| !r.prompt.trim().is_empty())
            .take(self.limits.sample_prompts)
            .map(|r| SamplePrompt {
                image_id: r.image_id,
                model: r.model.clone(),
                prompt: r.prompt.clone(),
            })
            .collect();
        self
    }

    pub fn top_n(&self, table: &FrequencyTable, n: usize) -> Vec<RankedEntry> {
        top_n(table, n, self.state.total_images)
    }

    /// LoRAs by usage count, then first-seen order.
    pub fn top_loras(&self, n: usize) -> Vec<LoraEntry> {
        let total = self.state.total_images;
        if total == 0 {
            return Vec::new();
        }
        let mut loras: Vec<LoraEntry> = self
            .state
            .loras_in_order()
            .map(|(name, stats)| LoraEntry {
                name: name.to_string(),
                usage_count: stats.usage_count,
                percentage: percentage(stats.usage_count, total),
                average_weight: stats.average_weight(),
                model_id: stats.model_id,
                model_version_id: stats.model_version_id,
            })
            .collect();
        loras.sort_by(|a, b| b.usage_count.cmp(&a.usage_count));
        loras.truncate(n);
        loras
    }

    pub fn build(&self) -> AnalysisReport {
        let state = self.state;
        let limits = &self.limits;
        AnalysisReport {
            collection_id: self.collection_id,
            limit_applied: self.limit_applied,
            total_images: state.total_images,
            style_breakdown: StyleBreakdown {
                positive: state.positive_styles,
                negative: state.negative_styles,
            },
            top_models: self.top_n(&state.models, limits.models),
            top_model_versions: self.top_n(&state.model_versions, limits.model_versions),
            top_samplers: self.top_n(&state.samplers, limits.samplers),
            top_steps: self.top_n(&state.steps, limits.steps),
            top_cfg_scales: self.top_n(&state.cfg_scales, limits.cfg_scales),
            top_loras: self.top_loras(limits.loras),
            top_tags: self.top_n(&state.tags, limits.tags),
            top_authors: self.top_n(&state.authors, limits.authors),
            top_positive_concepts: self.top_n(&state.positive_concepts, limits.positive_concepts),
            top_negative_concepts: self.top_n(&state.negative_concepts, limits.negative_concepts),
            top_positive_phrases: self.top_n(&state.positive_phrases, limits.positive_phrases),
            top_negative_phrases: self.top_n(&state.negative_phrases, limits.negative_phrases),
            sample_prompts: self.sample_prompts.clone(),
        }
    }
}
