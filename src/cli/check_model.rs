use anyhow::{Context, Result};

use crate::civitai::create_source;
use crate::config::Config;
use crate::console::render_availability;

pub async fn run(
    model_id: u64,
    version_id: Option<u64>,
    token: Option<String>,
    config_path: Option<String>,
    dry_run: bool,
) -> Result<()> {
    let config = Config::load_with_path(config_path)?;
    let source = create_source(&config, token.as_deref(), dry_run)?;

    let result = source
        .check_model_availability(model_id, version_id)
        .await
        .with_context(|| format!("Failed to check model {}", model_id))?;

    print!("{}", render_availability(&result, config.report.line_length));
    Ok(())
}
