use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use super::auth::SESSION_COOKIE_NAME;
use super::error::CivitaiError;
use super::records::{apply_generation_data, tags_by_score, CollectionItem, GenerationData, ImageRecord, InfinitePage, RawModelVersion, VotableTag};
use super::source::{FetchLimit, ImageSource, ModelAvailability};
use crate::config::{CivitaiConfig, FetchConfig};
use crate::util::SecretString;

/// Client for Civitai's private tRPC endpoints, authenticated with a browser
/// session cookie. Every procedure is a GET with `?input={"json": payload}`.
pub struct TrpcClient {
    base_url: String,
    token: SecretString,
    fingerprint: Option<String>,
    user_agent: String,
    client_version: String,
    fetch: FetchConfig,
    client: Client,
}

impl TrpcClient {
    pub fn new(token: SecretString, civitai: &CivitaiConfig, fetch: &FetchConfig) -> Result<Self, CivitaiError> {
        Ok(Self {
            base_url: civitai.base_url.trim_end_matches('/').to_string(),
            token,
            fingerprint: civitai.fingerprint.clone().filter(|f| !f.trim().is_empty()),
            user_agent: civitai.user_agent.clone(),
            client_version: civitai.client_version.clone(),
            fetch: fetch.clone(),
            client: Client::builder()
                .timeout(Duration::from_secs(civitai.timeout_secs))
                .build()?,
        })
    }

    /// The `input` query value. A first page has no cursor, and tRPC's
    /// superjson wants that spelled out as `undefined` in `meta`.
    pub fn input_param(payload: &Value, cursor_undefined: bool) -> String {
        let wrapped = if cursor_undefined {
            json!({"json": payload, "meta": {"values": {"cursor": ["undefined"]}}})
        } else {
            json!({"json": payload})
        };
        wrapped.to_string()
    }

    /// Call a procedure and decode `result.data.json` into `T`.
    pub async fn query<T: DeserializeOwned>(&self, procedure: &str, payload: Value) -> Result<T, CivitaiError> {
        let input = Self::input_param(&payload, false);
        self.query_with_input(procedure, input).await
    }

    async fn query_with_input<T: DeserializeOwned>(&self, procedure: &str, input: String) -> Result<T, CivitaiError> {
        let url = format!("{}/{}", self.base_url, procedure);
        debug!("GET {} input={}", url, input);

        let mut request = self
            .client
            .get(&url)
            .query(&[("input", input.as_str())])
            .header("Cookie", format!("{}={}", SESSION_COOKIE_NAME, self.token.expose()))
            .header("User-Agent", &self.user_agent)
            .header("Accept", "*/*")
            .header("Content-Type", "application/json")
            .header("Referer", "https://civitai.com/")
            .header("x-client", "web")
            .header("x-client-version", &self.client_version)
            .header("x-client-date", client_date());
        if let Some(fingerprint) = &self.fingerprint {
            request = request.header("x-fingerprint", fingerprint);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!("{} -> {} ({} bytes)", procedure, status, body.len());

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CivitaiError::Unauthorized(status.as_u16()));
        }
        if !status.is_success() {
            return Err(CivitaiError::Http {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let envelope: Value = serde_json::from_str(&body).map_err(|e| CivitaiError::decode(procedure, e))?;
        let data = unwrap_envelope(envelope)?;
        serde_json::from_value(data).map_err(|e| CivitaiError::decode(procedure, e))
    }

    /// One `image.getInfinite` page of a collection.
    pub async fn infinite_page(&self, collection_id: u64, cursor: Option<&str>) -> Result<InfinitePage, CivitaiError> {
        let mut payload = json!({
            "collectionId": collection_id,
            "period": self.fetch.period,
            "sort": self.fetch.sort,
            "browsingLevel": self.fetch.browsing_level,
            "include": ["cosmetics"],
            "excludedTagIds": self.fetch.excluded_tag_ids,
            "disablePoi": true,
            "disableMinor": false,
            "authed": true,
        });
        if let Some(cursor) = cursor {
            payload["cursor"] = json!(cursor);
        }
        let input = Self::input_param(&payload, cursor.is_none());
        let page: Option<InfinitePage> = self.query_with_input("image.getInfinite", input).await?;
        Ok(page.unwrap_or_default())
    }

    /// Collection items up to `limit`, following cursors until none is left or
    /// `max_pages` pages have been read.
    pub async fn collection_items(&self, collection_id: u64, limit: FetchLimit) -> Result<Vec<CollectionItem>, CivitaiError> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0;

        loop {
            let page = self.infinite_page(collection_id, cursor.as_deref()).await?;
            pages += 1;
            debug!("Collection {} page {}: {} items", collection_id, pages, page.items.len());
            items.extend(page.items);

            if limit.is_reached(items.len()) {
                break;
            }
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
            if pages >= self.fetch.max_pages {
                warn!(
                    "Stopping after {} pages (max_pages); {} items fetched so far",
                    pages,
                    items.len()
                );
                break;
            }
        }

        if let Some(n) = limit.as_count() {
            items.truncate(n);
        }
        Ok(items)
    }

    pub async fn generation_data(&self, image_id: u64) -> Result<GenerationData, CivitaiError> {
        let data: Option<GenerationData> = self
            .query("image.getGenerationData", json!({"id": image_id, "authed": true}))
            .await?;
        Ok(data.unwrap_or_default())
    }

    pub async fn votable_tags(&self, image_id: u64) -> Result<Vec<String>, CivitaiError> {
        let tags: Option<Vec<VotableTag>> = self
            .query("tag.getVotableTags", json!({"id": image_id, "type": "image", "authed": true}))
            .await?;
        Ok(tags_by_score(tags.unwrap_or_default()))
    }

    pub async fn image_info(&self, image_id: u64) -> Result<CollectionItem, CivitaiError> {
        let image: Option<CollectionItem> = self.query("image.get", json!({"id": image_id, "authed": true})).await?;
        image.ok_or_else(|| CivitaiError::NotFound(format!("image {}", image_id)))
    }

    /// Generation data, tags and author for one image. Missing tags or author
    /// are tolerated; auth failures are not.
    async fn build_record(&self, item: &CollectionItem) -> Result<ImageRecord, CivitaiError> {
        let mut record = ImageRecord::new(item.id);
        record.image_url = item.image_url();
        record.author = item.username();

        apply_generation_data(&mut record, self.generation_data(item.id).await?);

        record.tags = match self.votable_tags(item.id).await {
            Ok(tags) => tags,
            Err(e) if e.is_auth() => return Err(e),
            Err(e) => {
                warn!("No tags for image {}: {}", item.id, e);
                Vec::new()
            }
        };

        if record.author.is_none() {
            record.author = match self.image_info(item.id).await {
                Ok(info) => info.username(),
                Err(e) if e.is_auth() => return Err(e),
                Err(e) => {
                    debug!("No author for image {}: {}", item.id, e);
                    None
                }
            };
        }

        Ok(record)
    }
}

#[async_trait]
impl ImageSource for TrpcClient {
    async fn fetch_collection(&self, collection_id: u64, limit: FetchLimit) -> Result<Vec<ImageRecord>, CivitaiError> {
        let items = self.collection_items(collection_id, limit).await?;
        info!("Collection {}: {} images to fetch", collection_id, items.len());

        let mut records = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            debug!("Fetching image {}/{} ({})", i + 1, items.len(), item.id);
            match self.build_record(item).await {
                Ok(record) => records.push(record),
                Err(e) if e.is_auth() => return Err(e),
                Err(e) => warn!("Skipping image {}: {}", item.id, e),
            }
        }
        Ok(records)
    }

    async fn fetch_image(&self, image_id: u64) -> Result<ImageRecord, CivitaiError> {
        let item = self.image_info(image_id).await?;
        self.build_record(&item).await
    }

    async fn check_model_availability(
        &self,
        model_id: u64,
        model_version_id: Option<u64>,
    ) -> Result<ModelAvailability, CivitaiError> {
        let mut result = ModelAvailability::unknown(model_id, model_version_id);
        let Some(version_id) = model_version_id else {
            result.error = Some("No model_version_id provided - cannot verify availability".to_string());
            return Ok(result);
        };

        let version: Option<RawModelVersion> = match self
            .query("modelVersion.getById", json!({"id": version_id, "authed": true}))
            .await
        {
            Ok(v) => v,
            Err(CivitaiError::Http { status: 404, .. }) => None,
            Err(e) => return Err(e),
        };

        let Some(version) = version else {
            result.available = Some(false);
            result.error = Some("Model version not found".to_string());
            return Ok(result);
        };

        let status = version
            .model
            .and_then(|m| m.status)
            .or(version.status)
            .unwrap_or_else(|| "Unknown".to_string());
        Ok(result.with_status(Some(status)))
    }
}

/// Pull `result.data.json` out of a tRPC response (single or batched) or turn
/// its `error` member into [`CivitaiError::Trpc`].
pub fn unwrap_envelope(envelope: Value) -> Result<Value, CivitaiError> {
    let item = match envelope {
        Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        other => other,
    };

    if let Some(error) = item.get("error") {
        let message = error
            .pointer("/json/message")
            .or_else(|| error.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("Unknown error");
        return Err(CivitaiError::Trpc(message.to_string()));
    }

    Ok(item.pointer("/result/data/json").cloned().unwrap_or(Value::Null))
}

fn client_date() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
        .to_string()
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 500;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
