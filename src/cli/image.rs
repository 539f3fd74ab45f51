use anyhow::{Context, Result};
use serde::Serialize;

use crate::analysis::{PromptAnalyzer, PromptBreakdown};
use crate::civitai::{create_source, ImageRecord};
use crate::config::Config;
use crate::console::render_image;

/// One image with the analysis of both of its prompts.
#[derive(Debug, Serialize)]
pub struct ImageAnalysis {
    pub record: ImageRecord,
    pub positive: PromptBreakdown,
    pub negative: PromptBreakdown,
}

impl ImageAnalysis {
    pub fn new(record: ImageRecord, analyzer: &PromptAnalyzer) -> Self {
        let positive = analyzer.breakdown(&record.prompt);
        let negative = analyzer.breakdown(&record.negative_prompt);
        Self {
            record,
            positive,
            negative,
        }
    }
}

pub async fn run(
    image_id: u64,
    json: bool,
    token: Option<String>,
    config_path: Option<String>,
    dry_run: bool,
) -> Result<()> {
    let config = Config::load_with_path(config_path)?;
    let source = create_source(&config, token.as_deref(), dry_run)?;

    let record = source
        .fetch_image(image_id)
        .await
        .with_context(|| format!("Failed to fetch image {}", image_id))?;

    let analyzer = PromptAnalyzer::new(config.analysis.clone());
    let analysis = ImageAnalysis::new(record, &analyzer);

    if json {
        let out = serde_json::to_string_pretty(&analysis).context("Failed to serialize image")?;
        println!("{}", out);
    } else {
        print!(
            "{}",
            render_image(
                &analysis.record,
                &analysis.positive,
                &analysis.negative,
                config.report.line_length
            )
        );
    }
    Ok(())
}
