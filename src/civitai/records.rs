//! Image records handed to the analysis core, and the raw tRPC shapes they are
//! built from.
//!
//! Upstream payloads are loosely typed: numbers sometimes arrive as strings,
//! prompts are occasionally `null` or an object. Everything here degrades to
//! `None`/`""` instead of failing the whole image.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One LoRA invocation on an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoraUsage {
    pub name: String,
    pub weight: f64,
    #[serde(default)]
    pub model_id: Option<u64>,
    #[serde(default)]
    pub model_version_id: Option<u64>,
    #[serde(default)]
    pub version_name: Option<String>,
}

impl LoraUsage {
    pub fn new(name: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            weight,
            model_id: None,
            model_version_id: None,
            version_name: None,
        }
    }
}

/// Per-image metadata consumed by the aggregator. Read-only to the core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub image_id: u64,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub model_version: Option<String>,
    #[serde(default)]
    pub base_model: Option<String>,
    #[serde(default)]
    pub sampler: Option<String>,
    #[serde(default)]
    pub steps: Option<u32>,
    #[serde(default)]
    pub cfg_scale: Option<f64>,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default)]
    pub clip_skip: Option<u32>,
    #[serde(default)]
    pub loras: Vec<LoraUsage>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl ImageRecord {
    pub fn new(image_id: u64) -> Self {
        Self {
            image_id,
            ..Self::default()
        }
    }

    pub fn page_url(&self) -> String {
        format!("https://civitai.com/images/{}", self.image_id)
    }
}

const IMAGE_CDN_BASE: &str = "https://image.civitai.com/xG1nkqKTMzGDvpLrqFT7WA";

/// Full-resolution CDN URL for an image hash. The file name defaults to the
/// hash with a `.jpeg` extension when upstream gives none.
pub fn original_image_url(hash: &str, name: Option<&str>) -> String {
    let name = match name {
        Some(n) if !n.trim().is_empty() => n.to_string(),
        _ => format!("{}.jpeg", hash),
    };
    format!("{}/{}/original=true/quality=90/{}", IMAGE_CDN_BASE, hash, name)
}

// ============================================================================
// Raw wire shapes
// ============================================================================

/// `image.getInfinite` page. Items share their shape with `image.get`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfinitePage {
    #[serde(default)]
    pub items: Vec<CollectionItem>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionItem {
    #[serde(deserialize_with = "required_u64")]
    pub id: u64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    /// Image hash on the CDN.
    #[serde(default, deserialize_with = "lenient_string")]
    pub url: Option<String>,
    #[serde(default)]
    pub user: Option<RawUser>,
}

impl CollectionItem {
    pub fn username(&self) -> Option<String> {
        self.user.as_ref().and_then(|u| u.username.clone())
    }

    pub fn image_url(&self) -> Option<String> {
        self.url
            .as_deref()
            .map(|hash| original_image_url(hash, self.name.as_deref()))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawUser {
    #[serde(default, deserialize_with = "lenient_string")]
    pub username: Option<String>,
}

/// `image.getGenerationData` result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationData {
    #[serde(default)]
    pub meta: Option<Value>,
    #[serde(default)]
    pub resources: Vec<RawResource>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawResource {
    #[serde(default, deserialize_with = "lenient_string")]
    pub model_type: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "lenient_string")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub model_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub version_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub model_id: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub model_version_id: Option<u64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub strength: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Checkpoint,
    Lora,
    Other,
}

impl RawResource {
    pub fn display_name(&self) -> Option<&str> {
        self.model_name
            .as_deref()
            .or(self.name.as_deref())
            .filter(|n| !n.trim().is_empty())
    }

    /// Typed resources are classified by `modelType`/`type`; untyped ones fall
    /// back to their name.
    pub fn kind(&self) -> ResourceKind {
        let declared = self
            .model_type
            .as_deref()
            .or(self.kind.as_deref())
            .map(str::to_lowercase);

        let probe = match declared {
            Some(t) if !t.is_empty() => t,
            _ => self.display_name().unwrap_or_default().to_lowercase(),
        };

        if probe.contains("lora") || probe.contains("locon") || probe.contains("lycoris") {
            ResourceKind::Lora
        } else if probe.contains("checkpoint") {
            ResourceKind::Checkpoint
        } else {
            ResourceKind::Other
        }
    }

    /// Strength, with absent or zero meaning the default of 1.0.
    pub fn weight(&self) -> f64 {
        match self.strength {
            Some(s) if s != 0.0 && s.is_finite() => s,
            _ => 1.0,
        }
    }
}

/// `tag.getVotableTags` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct VotableTag {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub score: Option<f64>,
}

/// Tag names ordered by score, highest first. Ties keep upstream order.
pub fn tags_by_score(mut tags: Vec<VotableTag>) -> Vec<String> {
    tags.sort_by(|a, b| {
        let (a, b) = (a.score.unwrap_or(0.0), b.score.unwrap_or(0.0));
        b.partial_cmp(&a).unwrap_or(std::cmp::Ordering::Equal)
    });
    tags.into_iter()
        .filter_map(|t| t.name)
        .filter(|n| !n.trim().is_empty())
        .collect()
}

/// `modelVersion.getById` result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawModelVersion {
    #[serde(default)]
    pub model: Option<RawModel>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawModel {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: Option<String>,
}

/// Merge generation data into a record. Prompts that are missing or not
/// strings become empty; a checkpoint resource names the model unless the
/// record already has one.
pub fn apply_generation_data(record: &mut ImageRecord, data: GenerationData) {
    if let Some(meta) = data.meta.as_ref() {
        record.prompt = meta_str(meta, "prompt").unwrap_or_default();
        record.negative_prompt = meta_str(meta, "negativePrompt").unwrap_or_default();
        record.sampler = meta_str(meta, "sampler").filter(|s| !s.trim().is_empty());
        record.steps = meta.get("steps").and_then(value_u64).and_then(|s| u32::try_from(s).ok());
        record.cfg_scale = meta.get("cfgScale").and_then(value_f64);
        record.seed = meta.get("seed").and_then(value_i64);
        record.clip_skip = meta
            .get("clipSkip")
            .and_then(value_u64)
            .and_then(|s| u32::try_from(s).ok());
        record.base_model = meta_str(meta, "baseModel").filter(|s| !s.trim().is_empty());
    }

    for resource in &data.resources {
        match resource.kind() {
            ResourceKind::Lora => {
                let Some(name) = resource.display_name() else {
                    continue;
                };
                record.loras.push(LoraUsage {
                    name: name.to_string(),
                    weight: resource.weight(),
                    model_id: resource.model_id,
                    model_version_id: resource.model_version_id,
                    version_name: resource.version_name.clone(),
                });
            }
            ResourceKind::Checkpoint if record.model.is_none() => {
                record.model = resource.display_name().map(str::to_string);
                record.model_version = resource.version_name.clone();
            }
            _ => {}
        }
    }
}

fn meta_str(meta: &Value, key: &str) -> Option<String> {
    meta.get(key).and_then(Value::as_str).map(str::to_string)
}

fn value_u64(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_f64(v: &Value) -> Option<f64> {
    let parsed = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(match v {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.as_ref().and_then(value_u64))
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.as_ref().and_then(value_f64))
}

fn required_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    let v = Value::deserialize(d)?;
    value_u64(&v).ok_or_else(|| serde::de::Error::custom(format!("expected an id, got {}", v)))
}
