//! r3k CLI binary.
//!
//! Builds the Russell-3000-like universe from CRSP, stores its daily returns
//! and estimates Fama-French loadings.

mod integration;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use integration::layout::DataLayout;
use integration::pipeline::{
    PipelineConfig, RunSummary, run_constituents, run_fama, run_info, run_loadings, run_returns,
};
use integration::source::AnySource;
use r3k::SnapshotConfig;
use r3k_data::french::{FRENCH_BASE_URL, FrenchClient};
use r3k_risk::LoadingConfig;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "r3k")]
#[command(about = "r3k: CRSP universe, returns and factor loadings", long_about = None)]
#[command(version)]
struct Cli {
    /// Data directory (default: ./data if present, else the platform data dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Read CRSP from a local SQLite mirror instead of WRDS
    #[arg(long, global = true)]
    sqlite: Option<PathBuf>,

    /// First date of the window (YYYY-MM-DD)
    #[arg(long, global = true, default_value = "2000-01-01")]
    start: NaiveDate,

    /// Last date of the window (YYYY-MM-DD, default: today)
    #[arg(long, global = true)]
    end: Option<NaiveDate>,

    /// Summary output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Snapshot the largest securities at each month end
    Constituents {
        /// Securities kept per month
        #[arg(long, default_value = "3000")]
        top_n: usize,

        /// Calendar days searched back for a trading day
        #[arg(long, default_value = "10")]
        max_lookback_days: u32,
    },

    /// Fetch monthly daily-returns panels for active securities
    Returns {
        /// Months before each membership month also fetched
        #[arg(long, default_value = "1")]
        lookback_months: usize,
    },

    /// Fetch the name history of every security in the membership panel
    Info,

    /// Download the Fama-French factor files
    Fama {
        /// Data library base URL
        #[arg(long, default_value = FRENCH_BASE_URL)]
        base_url: String,
    },

    /// Estimate factor loadings for each stored month
    Loadings {
        /// Months of returns pooled per regression
        #[arg(long, default_value = "1")]
        window: usize,

        /// Concurrent panel file reads
        #[arg(long, default_value = "8")]
        concurrency: usize,

        /// Minimum usable observations per security
        #[arg(long, default_value = "0")]
        min_observations: usize,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let layout = DataLayout::from_defaults(cli.data_dir);
    let mut config = PipelineConfig {
        start: cli.start,
        end: cli.end.unwrap_or_else(|| Utc::now().date_naive()),
        ..PipelineConfig::default()
    };

    let summary = match cli.command {
        Commands::Constituents {
            top_n,
            max_lookback_days,
        } => {
            config.snapshot = SnapshotConfig {
                top_n,
                max_lookback_days,
            };
            let source = AnySource::connect(cli.sqlite.as_deref()).await?;
            run_constituents(&source, &layout, &config).await?
        }
        Commands::Returns { lookback_months } => {
            config.lookback_months = lookback_months;
            let source = AnySource::connect(cli.sqlite.as_deref()).await?;
            run_returns(&source, &layout, &config).await?
        }
        Commands::Info => {
            let source = AnySource::connect(cli.sqlite.as_deref()).await?;
            run_info(&source, &layout).await?
        }
        Commands::Fama { base_url } => {
            let client = FrenchClient::with_base_url(base_url)?.scratch_dir(layout.scratch_dir()?);
            run_fama(&client, &layout, &config).await?
        }
        Commands::Loadings {
            window,
            concurrency,
            min_observations,
        } => {
            config.window = window;
            config.concurrency = concurrency;
            config.loadings = LoadingConfig { min_observations };
            run_loadings(&layout, &config).await?
        }
    };

    print_summary(&summary, cli.format)?;
    Ok(())
}

fn print_summary(summary: &RunSummary, format: OutputFormat) -> Result<(), serde_json::Error> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(summary)?),
        OutputFormat::Text => {
            println!("\n=== {} ===", summary.run);
            println!("Output:   {}", summary.output.display());
            println!("Written:  {}", summary.written);
            if summary.skipped > 0 {
                println!("Skipped:  {} (already present)", summary.skipped);
            }
            if summary.empty > 0 {
                println!("Empty:    {} (no active securities)", summary.empty);
            }
            println!("Records:  {}", summary.records);
            if summary.warnings > 0 {
                println!("Warnings: {}", summary.warnings);
            }
        }
    }
    Ok(())
}
