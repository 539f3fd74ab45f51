use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::analysis::{AnalysisSettings, ReportLimits};
use crate::util::SecretString;

pub const CONFIG_FILE_NAME: &str = "civitai-analyzer.toml";
pub const APP_DIR_NAME: &str = "civitai-analyzer";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub civitai: CivitaiConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub analysis: AnalysisSettings,
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CivitaiConfig {
    /// tRPC endpoint root
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Inline session token. Lowest priority; prefer the cache file or env.
    #[serde(default, skip_serializing)]
    pub session_token: Option<SecretString>,

    /// Extra environment variable checked after CIVITAI_SESSION_COOKIE and
    /// CIVITAI_SESSION_TOKEN
    #[serde(default)]
    pub token_env: Option<String>,

    /// Token cache file (default: <config_dir>/civitai-analyzer/session_token)
    #[serde(default)]
    pub token_cache: Option<PathBuf>,

    /// Optional `x-fingerprint` header copied from a browser session
    #[serde(default)]
    pub fingerprint: Option<String>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_client_version")]
    pub client_version: String,

    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for CivitaiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            session_token: None,
            token_env: None,
            token_cache: None,
            fingerprint: None,
            user_agent: default_user_agent(),
            client_version: default_client_version(),
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Images to fetch when `--limit` is not given; -1 fetches all
    #[serde(default = "default_limit")]
    pub limit: i64,

    /// Safety stop for cursor pagination (default: 10)
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// NSFW level bit flags: 1 PG, 2 PG-13, 4 R, 8 X, 16 XXX (default: 31, everything)
    #[serde(default = "default_browsing_level")]
    pub browsing_level: u32,

    #[serde(default = "default_period")]
    pub period: String,

    #[serde(default = "default_sort")]
    pub sort: String,

    #[serde(default)]
    pub excluded_tag_ids: Vec<u64>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            max_pages: default_max_pages(),
            browsing_level: default_browsing_level(),
            period: default_period(),
            sort: default_sort(),
            excluded_tag_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Console width for normal output (default: 80)
    #[serde(default = "default_line_length")]
    pub line_length: usize,

    /// Console width with `--wide` (default: 120)
    #[serde(default = "default_wide_line_length")]
    pub wide_line_length: usize,

    #[serde(default)]
    pub limits: ReportLimits,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            line_length: default_line_length(),
            wide_line_length: default_wide_line_length(),
            limits: ReportLimits::default(),
        }
    }
}

impl ReportConfig {
    pub fn width(&self, wide: bool) -> usize {
        if wide {
            self.wide_line_length
        } else {
            self.line_length
        }
    }
}

fn default_base_url() -> String {
    "https://civitai.com/api/trpc".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/144.0.0.0 Safari/537.36"
        .to_string()
}

fn default_client_version() -> String {
    "5.0.1401".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_limit() -> i64 {
    50
}

fn default_max_pages() -> usize {
    10
}

fn default_browsing_level() -> u32 {
    31
}

fn default_period() -> String {
    "AllTime".to_string()
}

fn default_sort() -> String {
    "Newest".to_string()
}

fn default_line_length() -> usize {
    80
}

fn default_wide_line_length() -> usize {
    120
}

impl Config {
    /// Load from the default search paths
    pub fn load() -> Result<Self> {
        Self::load_with_path(None)
    }

    /// Load configuration from a specific path, or use default search paths.
    /// An explicit path must exist and parse.
    pub fn load_with_path(path: Option<String>) -> Result<Self> {
        if let Some(config_path) = path {
            debug!("Loading config from explicit path: {}", config_path);
            return Self::load_from_path(&config_path)
                .with_context(|| format!("Failed to load config from {}", config_path));
        }

        // Per-directory config first
        if Path::new(CONFIG_FILE_NAME).exists() {
            debug!("Loading config from ./{}", CONFIG_FILE_NAME);
            return Self::load_from_path(CONFIG_FILE_NAME)
                .with_context(|| format!("Failed to load ./{}", CONFIG_FILE_NAME));
        }

        if let Some(config_path) = Self::user_config_path() {
            if config_path.exists() {
                debug!("Loading config from {:?}", config_path);
                return Self::load_from_path(&config_path)
                    .with_context(|| format!("Failed to load {}", config_path.display()));
            }
        }

        debug!("Using default config");
        Ok(Self::default())
    }

    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join("config.toml"))
    }

    fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.civitai.base_url, "https://civitai.com/api/trpc");
        assert_eq!(config.fetch.limit, 50);
        assert_eq!(config.fetch.max_pages, 10);
        assert_eq!(config.fetch.browsing_level, 31);
        assert_eq!(config.report.width(false), 80);
        assert_eq!(config.report.width(true), 120);
        assert_eq!(config.analysis.comma_density_threshold, 0.3);
    }

    #[test]
    fn test_config_serialization_hides_token() {
        let mut config = Config::default();
        config.civitai.session_token = Some(SecretString::new("x".repeat(120)));
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("base_url = \"https://civitai.com/api/trpc\""));
        assert!(!toml_str.contains(&"x".repeat(120)));
        assert!(!toml_str.contains("session_token"));
    }

    #[test]
    fn test_partial_sections() {
        let config: Config = toml::from_str(
            r#"
[fetch]
limit = -1
sort = "MostReactions"

[analysis]
extra_stop_words = ["wearing"]

[report.limits]
tags = 5
"#,
        )
        .unwrap();
        assert_eq!(config.fetch.limit, -1);
        assert_eq!(config.fetch.sort, "MostReactions");
        assert_eq!(config.fetch.period, "AllTime");
        assert_eq!(config.analysis.extra_stop_words, vec!["wearing"]);
        assert_eq!(config.analysis.max_phrase_words, 4);
        assert_eq!(config.report.limits.tags, 5);
        assert_eq!(config.report.limits.models, 10);
        assert_eq!(config.civitai.timeout_secs, 30);
    }

    #[test]
    fn test_session_token_deserializes_masked() {
        let config: Config = toml::from_str("[civitai]\nsession_token = \"abc\"").unwrap();
        let token = config.civitai.session_token.unwrap();
        assert_eq!(token.expose(), "abc");
        assert_eq!(format!("{:?}", token), "***");
    }

    #[test]
    fn test_explicit_missing_path_fails() {
        let result = Config::load_with_path(Some("/nonexistent/civitai-analyzer.toml".to_string()));
        assert!(result.is_err());
    }
}
