//! Session-token resolution.
//!
//! The private API authenticates with the `__Secure-civitai-token` cookie of a
//! logged-in browser session. Acquiring it is left to the user; this module only
//! finds, validates and caches it.

use anyhow::{bail, Context, Result};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::error::CivitaiError;
use crate::config::{CivitaiConfig, APP_DIR_NAME};
use crate::util::{write_atomic, SecretString};

pub const SESSION_COOKIE_NAME: &str = "__Secure-civitai-token";

/// Environment variables checked, in order, before any configured one.
pub const TOKEN_ENV_VARS: &[&str] = &["CIVITAI_SESSION_COOKIE", "CIVITAI_SESSION_TOKEN"];

/// Overrides the cache file location.
pub const CACHE_ENV_VAR: &str = "CIVITAI_SESSION_CACHE";

/// Session tokens are long JWE blobs; anything this short is a mistake
/// (an API key, a cookie name, a truncated paste).
pub const MIN_TOKEN_LEN: usize = 100;

/// Where a token came from, for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    Explicit,
    Cache(PathBuf),
    Env(String),
    Config,
}

impl fmt::Display for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenSource::Explicit => write!(f, "command line"),
            TokenSource::Cache(path) => write!(f, "cache file {}", path.display()),
            TokenSource::Env(var) => write!(f, "${}", var),
            TokenSource::Config => write!(f, "config file"),
        }
    }
}

pub fn is_plausible_token(token: &str) -> bool {
    token.trim().len() > MIN_TOKEN_LEN
}

/// Cache file path: `$CIVITAI_SESSION_CACHE`, then the configured path, then
/// `<config_dir>/civitai-analyzer/session_token`.
pub fn cache_path(config: &CivitaiConfig) -> Option<PathBuf> {
    if let Ok(path) = env::var(CACHE_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    if let Some(path) = &config.token_cache {
        return Some(path.clone());
    }
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join("session_token"))
}

/// Find a usable token. Priority: explicit, cache file, environment, config.
/// Candidates that are too short are skipped with a warning.
pub fn resolve_token(
    explicit: Option<&str>,
    config: &CivitaiConfig,
) -> Result<(SecretString, TokenSource), CivitaiError> {
    let mut candidates: Vec<(String, TokenSource)> = Vec::new();

    if let Some(token) = explicit {
        candidates.push((token.to_string(), TokenSource::Explicit));
    }

    if let Some(path) = cache_path(config) {
        match read_cached_token(&path) {
            Ok(Some(token)) => candidates.push((token, TokenSource::Cache(path))),
            Ok(None) => debug!("No token cache at {}", path.display()),
            Err(e) => warn!("Ignoring unreadable token cache {}: {:#}", path.display(), e),
        }
    }

    let env_vars = TOKEN_ENV_VARS
        .iter()
        .map(|v| v.to_string())
        .chain(config.token_env.clone());
    for var in env_vars {
        if let Ok(token) = env::var(&var) {
            candidates.push((token, TokenSource::Env(var)));
        }
    }

    if let Some(token) = &config.session_token {
        candidates.push((token.expose().to_string(), TokenSource::Config));
    }

    for (token, source) in candidates {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if !is_plausible_token(token) {
            warn!(
                "Token from {} is only {} characters; expected a session cookie longer than {}",
                source,
                token.len(),
                MIN_TOKEN_LEN
            );
            continue;
        }
        debug!("Using session token from {}", source);
        return Ok((SecretString::new(token.to_string()), source));
    }

    Err(CivitaiError::MissingToken)
}

fn read_cached_token(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let token = content.trim();
    Ok((!token.is_empty()).then(|| token.to_string()))
}

/// Validate and store a token in the cache file.
pub fn save_token(token: &str, path: &Path) -> Result<()> {
    let token = token.trim();
    if !is_plausible_token(token) {
        bail!(
            "That does not look like a session token ({} characters, expected more than {}). \
             Copy the value of the {} cookie.",
            token.len(),
            MIN_TOKEN_LEN,
            SESSION_COOKIE_NAME
        );
    }
    write_atomic(path, token.as_bytes())?;
    restrict_permissions(path)?;
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("Failed to restrict permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
