//! FloraScan CLI — identify plants from images and teach new ones.
//!
//! Structured JSON goes to stdout; diagnostics go to stderr. Exit code
//! is 0 when the reported operation succeeded, 1 otherwise.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use florascan::{
    resolve_data_dir, FloraConfig, IdentificationService, IdentifyReport, LearnReport,
    LearningService, ReferenceStore, DEFAULT_THRESHOLD,
};

#[derive(Parser)]
#[command(
    name = "florascan",
    about = "Content-based plant identification with an online learning loop",
    version
)]
struct Cli {
    /// Data directory holding the dataset, learned images, and cache.
    /// Also reads from FLORASCAN_DATA_DIR.
    #[arg(short, long, global = true)]
    data_dir: Option<String>,

    /// Similarity threshold for accepting a match.
    #[arg(long, global = true, default_value_t = DEFAULT_THRESHOLD)]
    threshold: f32,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Identify the plant in an image.
    Identify {
        /// Path to the query image.
        image: PathBuf,
    },

    /// Teach a new plant from an image and its name.
    Learn {
        /// Path to the image to learn from.
        image: PathBuf,

        /// Plant name to associate with the image.
        name: String,
    },

    /// Recompute the descriptor cache from every learned image.
    RebuildCache,

    /// Print reference-set counts as JSON.
    Stats,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let data_dir = resolve_data_dir(cli.data_dir.as_deref());
    tracing::debug!("using data dir {}", data_dir.display());
    let config = FloraConfig::new(&data_dir).with_threshold(cli.threshold);
    let store = Arc::new(ReferenceStore::new(config));

    let success = match cli.command {
        Commands::Identify { image } => {
            let service = IdentificationService::new(store);
            let report = IdentifyReport::from_result(service.identify(&image));
            println!("{}", serde_json::to_string_pretty(&report)?);
            report.success
        }

        Commands::Learn { image, name } => {
            let service = LearningService::new(store);
            let report = LearnReport::from_result(service.learn(&image, &name));
            println!("{}", serde_json::to_string_pretty(&report)?);
            report.success
        }

        Commands::RebuildCache => match store.rebuild_cache() {
            Ok(count) => {
                println!(
                    "{}",
                    serde_json::json!({ "success": true, "cached_descriptors": count })
                );
                true
            }
            Err(e) => {
                println!(
                    "{}",
                    serde_json::json!({ "success": false, "error": e.to_string() })
                );
                false
            }
        },

        Commands::Stats => match store.stats() {
            Ok(stats) => {
                println!("{}", serde_json::to_string_pretty(&stats)?);
                true
            }
            Err(e) => {
                println!(
                    "{}",
                    serde_json::json!({ "success": false, "error": e.to_string() })
                );
                false
            }
        },
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}
