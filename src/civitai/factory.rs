use anyhow::{Context, Result};
use tracing::info;

use super::auth::resolve_token;
use super::source::{ImageSource, MockImageSource};
use super::trpc::TrpcClient;
use crate::config::Config;

/// Create an image source based on configuration. `dry_run` uses canned
/// records and needs no token.
pub fn create_source(config: &Config, token: Option<&str>, dry_run: bool) -> Result<Box<dyn ImageSource>> {
    if dry_run {
        info!("Dry run: using built-in sample records");
        return Ok(Box::new(MockImageSource::new()));
    }

    let (token, source) = resolve_token(token, &config.civitai)?;
    info!("Using Civitai session token from {}", source);

    let client = TrpcClient::new(token, &config.civitai, &config.fetch).context("Failed to build Civitai client")?;
    Ok(Box::new(client))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::civitai::auth::{CACHE_ENV_VAR, TOKEN_ENV_VARS};
    use serial_test::serial;
    use std::env;

    #[tokio::test]
    async fn test_create_mock_source_for_dry_run() {
        let config = Config::default();
        let source = create_source(&config, None, true).unwrap();
        let image = source.fetch_image(1001).await.unwrap();
        assert_eq!(image.image_id, 1001);
    }

    #[test]
    #[serial]
    fn test_create_source_without_token_fails() {
        for var in TOKEN_ENV_VARS {
            env::remove_var(var);
        }
        let dir = tempfile::tempdir().unwrap();
        env::set_var(CACHE_ENV_VAR, dir.path().join("none"));

        let result = create_source(&Config::default(), None, false);
        env::remove_var(CACHE_ENV_VAR);

        let err = result.err().expect("expected missing token error");
        assert!(err.to_string().contains("No Civitai session token"));
    }

    #[test]
    #[serial]
    fn test_create_source_with_explicit_token() {
        let token = "t".repeat(120);
        let result = create_source(&Config::default(), Some(token.as_str()), false);
        assert!(result.is_ok());
    }
}
