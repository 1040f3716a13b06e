use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::instrument::WithSubscriber;

use ampetl::amplitude::{ExportClient, ExportWindow};
use ampetl::config::{ApiCredentials, Layout, StoreConfig};
use ampetl::store::S3Sink;
use ampetl::{logging, stages};

#[derive(Parser)]
#[command(name = "ampetl")]
#[command(about = "Batch ETL for Amplitude export archives", long_about = None)]
struct Cli {
    /// Root directory holding the pipeline's working directories
    #[arg(long, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the trailing export window into the drop directory
    Extract {
        /// How many days back the export window opens
        #[arg(long, default_value_t = 1)]
        days: i64,
    },
    /// Flatten pending export archives into the output directory
    Process,
    /// Upload pending event files to the bucket
    Upload,
    /// Run extract, process, and upload in order
    Run {
        /// How many days back the export window opens
        #[arg(long, default_value_t = 1)]
        days: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let layout = Layout::rooted_at(&cli.root);
    layout.ensure()?;

    match cli.command {
        Commands::Extract { days } => extract(&layout, days).await,
        Commands::Process => process(&layout),
        Commands::Upload => upload(&layout).await,
        Commands::Run { days } => {
            extract(&layout, days).await?;
            process(&layout)?;
            upload(&layout).await
        }
    }
}

async fn extract(layout: &Layout, days: i64) -> Result<()> {
    let subscriber = logging::for_run(&layout.load_logs_dir, "amplitude_extract")?;
    let credentials = ApiCredentials::from_env()?;
    let client = ExportClient::new(credentials)?;
    let window = ExportWindow::trailing(days, Local::now());

    stages::extract::run(&client, &window, &layout.drop_dir)
        .with_subscriber(subscriber)
        .await
}

fn process(layout: &Layout) -> Result<()> {
    let subscriber = logging::for_run(&layout.load_logs_dir, "amplitude_load")?;
    tracing::subscriber::with_default(subscriber, || stages::process::run(layout))
}

async fn upload(layout: &Layout) -> Result<()> {
    let subscriber = logging::for_run(&layout.upload_logs_dir, "amplitude_s3_upload")?;
    let store = StoreConfig::from_env()?;
    let sink = S3Sink::new(&store).await?;

    stages::upload::run(&sink, &store.key_prefix, &layout.output_dir, &layout.json_archive_dir)
        .with_subscriber(subscriber)
        .await
}
