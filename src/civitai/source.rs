use anyhow::bail;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::error::CivitaiError;
use super::records::{ImageRecord, LoraUsage};

/// How many collection images to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchLimit {
    Count(usize),
    /// Follow cursors until exhausted (still bounded by `max_pages`).
    All,
}

impl FetchLimit {
    /// Interpret the CLI value: `-1` means everything, positive values cap the count.
    pub fn from_arg(limit: i64) -> anyhow::Result<Self> {
        match limit {
            -1 => Ok(FetchLimit::All),
            n if n > 0 => Ok(FetchLimit::Count(n as usize)),
            n => bail!("Invalid limit {}: use a positive number or -1 for all images", n),
        }
    }

    pub fn as_count(&self) -> Option<usize> {
        match self {
            FetchLimit::Count(n) => Some(*n),
            FetchLimit::All => None,
        }
    }

    pub fn is_reached(&self, fetched: usize) -> bool {
        matches!(self, FetchLimit::Count(n) if fetched >= *n)
    }
}

impl fmt::Display for FetchLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchLimit::Count(n) => write!(f, "{}", n),
            FetchLimit::All => write!(f, "all"),
        }
    }
}

/// Whether a referenced model still exists on Civitai.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelAvailability {
    pub model_id: u64,
    pub model_version_id: Option<u64>,
    /// `None` when availability could not be determined.
    pub available: Option<bool>,
    pub status: Option<String>,
    pub civitai_url: String,
    pub archive_url: String,
    pub error: Option<String>,
}

impl ModelAvailability {
    /// Availability unknown; links filled in.
    pub fn unknown(model_id: u64, model_version_id: Option<u64>) -> Self {
        let query = model_version_id
            .map(|v| format!("?modelVersionId={}", v))
            .unwrap_or_default();
        Self {
            model_id,
            model_version_id,
            available: None,
            status: None,
            civitai_url: format!("https://civitai.com/models/{}{}", model_id, query),
            archive_url: format!("https://civitaiarchive.com/models/{}{}", model_id, query),
            error: None,
        }
    }

    /// Interpret the model status reported for a version. `Deleted` means gone.
    pub fn with_status(mut self, status: Option<String>) -> Self {
        let deleted = status.as_deref() == Some("Deleted");
        self.available = Some(!deleted);
        if deleted {
            self.error = Some("Model has been deleted from Civitai".to_string());
        }
        self.status = status;
        self
    }
}

/// Supplies image records for analysis.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// All records of a collection, in upstream order, up to `limit`.
    async fn fetch_collection(&self, collection_id: u64, limit: FetchLimit) -> Result<Vec<ImageRecord>, CivitaiError>;

    async fn fetch_image(&self, image_id: u64) -> Result<ImageRecord, CivitaiError>;

    async fn check_model_availability(
        &self,
        model_id: u64,
        model_version_id: Option<u64>,
    ) -> Result<ModelAvailability, CivitaiError>;
}

/// Offline source with canned records, for `--dry-run` and tests.
pub struct MockImageSource {
    records: Vec<ImageRecord>,
    deleted_versions: HashSet<u64>,
}

impl Default for MockImageSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockImageSource {
    pub fn new() -> Self {
        Self::with_records(sample_records())
    }

    pub fn with_records(records: Vec<ImageRecord>) -> Self {
        Self {
            records,
            deleted_versions: HashSet::new(),
        }
    }

    /// Report this model version as deleted from availability checks.
    pub fn with_deleted_version(mut self, model_version_id: u64) -> Self {
        self.deleted_versions.insert(model_version_id);
        self
    }
}

#[async_trait]
impl ImageSource for MockImageSource {
    async fn fetch_collection(&self, _collection_id: u64, limit: FetchLimit) -> Result<Vec<ImageRecord>, CivitaiError> {
        let take = limit.as_count().unwrap_or(self.records.len());
        Ok(self.records.iter().take(take).cloned().collect())
    }

    async fn fetch_image(&self, image_id: u64) -> Result<ImageRecord, CivitaiError> {
        self.records
            .iter()
            .find(|r| r.image_id == image_id)
            .cloned()
            .ok_or_else(|| CivitaiError::NotFound(format!("image {}", image_id)))
    }

    async fn check_model_availability(
        &self,
        model_id: u64,
        model_version_id: Option<u64>,
    ) -> Result<ModelAvailability, CivitaiError> {
        let result = ModelAvailability::unknown(model_id, model_version_id);
        let Some(version_id) = model_version_id else {
            return Ok(result);
        };
        let status = if self.deleted_versions.contains(&version_id) {
            "Deleted"
        } else {
            "Published"
        };
        Ok(result.with_status(Some(status.to_string())))
    }
}

fn lora(name: &str, weight: f64, model_id: u64, model_version_id: u64) -> LoraUsage {
    LoraUsage {
        model_id: Some(model_id),
        model_version_id: Some(model_version_id),
        ..LoraUsage::new(name, weight)
    }
}

/// A small mixed collection: tag and natural-language prompts, shared LoRAs.
pub fn sample_records() -> Vec<ImageRecord> {
    vec![
        ImageRecord {
            author: Some("lumen".to_string()),
            prompt: "masterpiece, best quality, 1girl, solo, long hair, (blue eyes:1.2), <lora:detail_tweaker:0.6>"
                .to_string(),
            negative_prompt: "lowres, bad anatomy, worst quality".to_string(),
            model: Some("Pony Diffusion".to_string()),
            model_version: Some("V6 XL".to_string()),
            sampler: Some("Euler a".to_string()),
            steps: Some(30),
            cfg_scale: Some(7.0),
            seed: Some(1_234_567),
            loras: vec![lora("Detail Tweaker", 0.6, 58390, 62833)],
            tags: vec!["woman".to_string(), "anime".to_string()],
            ..ImageRecord::new(1001)
        },
        ImageRecord {
            author: Some("lumen".to_string()),
            prompt: "a beautiful woman with long blonde hair, dramatic lighting".to_string(),
            negative_prompt: "blurry, lowres".to_string(),
            model: Some("Juggernaut XL".to_string()),
            model_version: Some("X".to_string()),
            sampler: Some("DPM++ 2M Karras".to_string()),
            steps: Some(25),
            cfg_scale: Some(5.5),
            loras: vec![lora("Detail Tweaker", 0.8, 58390, 62833)],
            tags: vec!["woman".to_string(), "photorealistic".to_string()],
            ..ImageRecord::new(1002)
        },
        ImageRecord {
            author: Some("quill".to_string()),
            prompt: "An old lighthouse on a rocky coast at dusk. Stormy sky, crashing waves.".to_string(),
            negative_prompt: String::new(),
            model: Some("Pony Diffusion".to_string()),
            model_version: Some("V6 XL".to_string()),
            sampler: Some("Euler a".to_string()),
            steps: Some(30),
            cfg_scale: Some(7.0),
            loras: vec![lora("Film Grain", 1.0, 12001, 14002)],
            tags: vec!["landscape".to_string(), "outdoors".to_string()],
            ..ImageRecord::new(1003)
        },
    ]
}
