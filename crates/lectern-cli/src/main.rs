//! Lectern CLI: run the ingestion pipeline against local files.
//!
//! Configuration comes from the environment (and `.env`); see `IngestConfig::from_env`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use lectern_cli::{init_tracing, resolve_content_type, upload_name};
use lectern_core::{IngestConfig, UploadRequest};
use lectern_services::{IngestionPipeline, VirusScanClient};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "lectern", about = "File ingestion pipeline CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every security check on a file without storing it
    Check {
        /// Path to the file to check
        file: PathBuf,
        /// Upload category (image, document, avatar, ...)
        #[arg(long, default_value = "document")]
        category: String,
        /// Declared MIME type; guessed from the extension when omitted
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Ingest one or more files into the upload directory
    Ingest {
        /// Paths to the files to ingest
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Upload category (image, document, avatar, ...)
        #[arg(long, default_value = "document")]
        category: String,
        /// Declared MIME type for every file; guessed per file when omitted
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Check whether the scan daemon answers PING
    Ping,
}

#[derive(Serialize)]
struct PingResponse {
    address: String,
    available: bool,
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

async fn open_request(
    path: &Path,
    category: &str,
    content_type: Option<&str>,
) -> anyhow::Result<UploadRequest<tokio::fs::File>> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let size = file
        .metadata()
        .await
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len();
    let name = upload_name(path);
    let content_type = resolve_content_type(content_type, &name);
    Ok(UploadRequest::new(name, content_type, size, category, file))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Arc::new(IngestConfig::from_env().context("Invalid ingestion configuration")?);

    match cli.command {
        Commands::Check {
            file,
            category,
            content_type,
        } => {
            let pipeline = IngestionPipeline::new(config).await?;
            let mut request = open_request(&file, &category, content_type.as_deref()).await?;
            let report = pipeline.check(&mut request).await;
            print_json(&report)?;
        }
        Commands::Ingest {
            files,
            category,
            content_type,
        } => {
            let pipeline = IngestionPipeline::new(config).await?;
            let mut requests = Vec::with_capacity(files.len());
            for file in &files {
                requests.push(open_request(file, &category, content_type.as_deref()).await?);
            }
            let results = pipeline.ingest_many(&mut requests).await;
            let failed = results.iter().filter(|r| !r.success).count();
            print_json(&results)?;
            if failed > 0 {
                anyhow::bail!("{} of {} uploads rejected", failed, results.len());
            }
        }
        Commands::Ping => {
            let scan = &config.virus_scan;
            let client = VirusScanClient::new(scan.clone());
            let available = client.is_daemon_available().await;
            print_json(&PingResponse {
                address: format!("{}:{}", scan.host, scan.port),
                available,
            })?;
            if !available {
                tracing::warn!("Scan daemon did not answer PING");
            }
        }
    }

    Ok(())
}
