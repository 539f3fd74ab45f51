use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use civitai_analyzer::cli;

#[derive(Parser)]
#[command(name = "civitai-analyzer", version)]
#[command(about = "Analyze prompt patterns across Civitai collections", long_about = None)]
struct Cli {
    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a collection and report models, LoRAs, concepts and phrases
    Analyze {
        /// Collection id (from civitai.com/collections/<id>)
        collection_id: u64,

        /// Images to fetch; -1 fetches the whole collection (default: from config, 50)
        #[arg(short, long, allow_negative_numbers = true)]
        limit: Option<i64>,

        /// Save the report as JSON (collection_<id>_analysis.json unless --output)
        #[arg(short, long)]
        save: bool,

        /// JSON output path (implies --save)
        #[arg(short, long)]
        output: Option<String>,

        /// Include the fetched image records in the JSON export
        #[arg(long)]
        include_records: bool,

        /// Wide console tables with LoRA ids and links
        #[arg(short, long)]
        wide: bool,

        /// Session token (overrides cache, environment and config)
        #[arg(long)]
        token: Option<String>,

        /// Path to config file (defaults to ./civitai-analyzer.toml or the user config dir)
        #[arg(long)]
        config: Option<String>,

        /// Analyze built-in sample records instead of calling Civitai
        #[arg(long)]
        dry_run: bool,
    },

    /// Show one image's metadata and prompt analysis
    Image {
        image_id: u64,

        /// Print JSON instead of the console view
        #[arg(long)]
        json: bool,

        #[arg(long)]
        token: Option<String>,

        #[arg(long)]
        config: Option<String>,

        #[arg(long)]
        dry_run: bool,
    },

    /// Check whether a model version is still available
    CheckModel {
        model_id: u64,

        #[arg(long)]
        version_id: Option<u64>,

        #[arg(long)]
        token: Option<String>,

        #[arg(long)]
        config: Option<String>,

        #[arg(long)]
        dry_run: bool,
    },

    /// Store a session token in the token cache
    SetToken {
        /// Token value; read from stdin when omitted
        #[arg(long)]
        token: Option<String>,

        /// Open the Civitai login page first
        #[arg(long)]
        open_browser: bool,

        #[arg(long)]
        config: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Analyze {
            collection_id,
            limit,
            save,
            output,
            include_records,
            wide,
            token,
            config,
            dry_run,
        } => {
            cli::analyze::run(
                collection_id,
                limit,
                save,
                output,
                include_records,
                wide,
                token,
                config,
                dry_run,
            )
            .await?;
        }
        Commands::Image {
            image_id,
            json,
            token,
            config,
            dry_run,
        } => {
            cli::image::run(image_id, json, token, config, dry_run).await?;
        }
        Commands::CheckModel {
            model_id,
            version_id,
            token,
            config,
            dry_run,
        } => {
            cli::check_model::run(model_id, version_id, token, config, dry_run).await?;
        }
        Commands::SetToken {
            token,
            open_browser,
            config,
        } => {
            cli::set_token::run(token, open_browser, config)?;
        }
    }

    Ok(())
}
