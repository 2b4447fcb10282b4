//! EcoSnap waste classification service.
//!
//! Usage:
//!   ecosnap serve
//!   ecosnap classify path/to/photo.jpg

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use ecosnap::{config::Config, image::ImagePayload};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ecosnap")]
#[command(about = "Waste classification proxy with EcoCredit rewards", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve,
    /// Classify a local image file and print the result as JSON
    Classify {
        /// Path to an image file
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(ecosnap::config::DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load()?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Classify { path } => classify(config, path).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting EcoSnap classification service");
    let state = ecosnap::build_state(&config)?;
    ecosnap::http::start_http_server(&config, state).await
}

async fn classify(config: Config, path: PathBuf) -> Result<()> {
    let classifier = ecosnap::build_classifier(&config)?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    let payload = ImagePayload::from_file_bytes(&path, &bytes, classifier.max_image_bytes())?;
    let result = classifier.classify(&payload).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
