use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::analysis::{AggregateState, AnalysisReport, PromptAnalyzer, ReportBuilder};
use crate::civitai::{create_source, FetchLimit, ImageRecord, ImageSource};
use crate::config::Config;
use crate::console::render_report;
use crate::util::write_atomic;

/// JSON export: the report, optionally followed by the raw records.
#[derive(Debug, Serialize)]
pub struct AnalysisExport<'a> {
    #[serde(flatten)]
    pub report: &'a AnalysisReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<&'a [ImageRecord]>,
}

pub fn default_output_path(collection_id: u64) -> PathBuf {
    PathBuf::from(format!("collection_{}_analysis.json", collection_id))
}

/// Aggregate fetched records into a report using the configured heuristics
/// and limits.
pub fn analyze_records(
    records: &[ImageRecord],
    config: &Config,
    collection_id: u64,
    limit: FetchLimit,
) -> AnalysisReport {
    let analyzer = PromptAnalyzer::new(config.analysis.clone());
    let state = AggregateState::from_records(records, &analyzer);
    ReportBuilder::new(&state)
        .limits(config.report.limits.clone())
        .collection(collection_id, limit.as_count())
        .samples_from(records)
        .build()
}

pub fn export_json(report: &AnalysisReport, records: Option<&[ImageRecord]>, path: &Path) -> Result<()> {
    let export = AnalysisExport { report, records };
    let json = serde_json::to_string_pretty(&export).context("Failed to serialize analysis")?;
    write_atomic(path, json.as_bytes())?;
    Ok(())
}

/// Fetch a collection and aggregate it. An empty collection is not an error:
/// it yields a report with `total_images = 0` and empty sections.
pub async fn fetch_and_analyze(
    source: &dyn ImageSource,
    config: &Config,
    collection_id: u64,
    limit: FetchLimit,
) -> Result<(AnalysisReport, Vec<ImageRecord>)> {
    let records = source
        .fetch_collection(collection_id, limit)
        .await
        .with_context(|| format!("Failed to fetch collection {}", collection_id))?;

    if records.is_empty() {
        warn!(
            "No images found in collection {}. Check the id and that your session can see it.",
            collection_id
        );
    } else {
        info!("Fetched {} images", records.len());
    }

    let report = analyze_records(&records, config, collection_id, limit);
    Ok((report, records))
}

#[allow(clippy::too_many_arguments)]
pub async fn run(
    collection_id: u64,
    limit_override: Option<i64>,
    save: bool,
    output: Option<String>,
    include_records: bool,
    wide: bool,
    token: Option<String>,
    config_path: Option<String>,
    dry_run: bool,
) -> Result<()> {
    let config = Config::load_with_path(config_path)?;
    let limit = FetchLimit::from_arg(limit_override.unwrap_or(config.fetch.limit))?;

    info!("Collection: {}", collection_id);
    info!("Limit: {}", limit);
    info!("Dry run: {}", dry_run);

    let source = create_source(&config, token.as_deref(), dry_run)?;
    let (report, records) = fetch_and_analyze(source.as_ref(), &config, collection_id, limit).await?;
    print!("{}", render_report(&report, config.report.width(wide), wide));

    if save || output.is_some() {
        let path = output
            .map(PathBuf::from)
            .unwrap_or_else(|| default_output_path(collection_id));
        let included = include_records.then_some(records.as_slice());
        export_json(&report, included, &path)?;
        println!("💾 Saved analysis to {}", path.display());
    }

    Ok(())
}
