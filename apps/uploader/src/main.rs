//! uploadtus command-line uploader.

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use uploadtus_client::{HttpTransport, SessionOutcome, UploadClient, UploadEvent};
use uploadtus_transfer::Payload;

use config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "uploadtus",
    about = "Upload a file to a tus server, resuming after network failures",
    version
)]
struct Cli {
    /// File to upload.
    file: PathBuf,

    /// Configuration file (defaults to the per-user uploader.toml).
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// tus creation endpoint.
    #[arg(long, short)]
    endpoint: Option<String>,

    /// Bytes per request.
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Retry delays in milliseconds, comma separated.
    #[arg(long, value_delimiter = ',')]
    retry_delays: Option<Vec<u64>>,

    /// Extra request header, `Name: value`. Repeatable.
    #[arg(long = "header", short = 'H', value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Extra metadata field, `key=value`. Repeatable.
    #[arg(long = "meta", short, value_parser = parse_metadata)]
    metadata: Vec<(String, String)>,

    /// Continue an upload created earlier.
    #[arg(long)]
    upload_url: Option<String>,

    /// JSON file remembering unfinished uploads.
    #[arg(long)]
    resume_store: Option<PathBuf>,

    /// Send a SHA-256 checksum with every chunk.
    #[arg(long)]
    checksum: bool,

    /// Log filter (overrides RUST_LOG), e.g. `debug` or `uploadtus_client=trace`.
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Applies command-line overrides on top of the file configuration.
    fn apply(&self, config: &mut Config) {
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
        }
        if let Some(delays) = &self.retry_delays {
            config.retry_delays_ms = delays.clone();
        }
        for (name, value) in &self.headers {
            config.headers.insert(name.clone(), value.clone());
        }
        if let Some(path) = &self.resume_store {
            config.resume_store = Some(path.clone());
        }
        if self.checksum {
            config.checksum = true;
        }
    }
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected `Name: value`, got `{raw}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("header name is empty".into());
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn parse_metadata(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected `key=value`, got `{raw}`"))?;
    Ok((key.to_string(), value.to_string()))
}

/// Guesses the `filetype` metadata from the file extension.
fn detect_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match ext.as_deref() {
        Some("webm") => "video/webm",
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    tracing::debug!(endpoint = %config.endpoint, chunk_size = config.chunk_size, "configuration ready");

    let rt = tokio::runtime::Runtime::new()?;
    let upload_url = rt.block_on(run(cli, config))?;

    println!("{upload_url}");
    Ok(())
}

async fn run(cli: Cli, config: Config) -> anyhow::Result<String> {
    let data = tokio::fs::read(&cli.file)
        .await
        .with_context(|| format!("reading {}", cli.file.display()))?;
    let filename = cli
        .file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut payload = Payload::from_bytes(data)
        .with_metadata("filename", filename)?
        .with_metadata("filetype", detect_content_type(&cli.file))?;
    for (key, value) in &cli.metadata {
        payload = payload.with_metadata(key.clone(), value.clone())?;
    }

    let mut transport = HttpTransport::builder();
    for (name, value) in &config.headers {
        transport = transport.header(name.clone(), value.clone());
    }
    if let Some(timeout) = config.request_timeout() {
        transport = transport.timeout(timeout);
    }
    let client = UploadClient::new(Arc::new(transport.build()?));

    let mut options = config.upload_options();
    if let Some(upload_url) = &cli.upload_url {
        options = options.resume(upload_url.clone(), None);
    }

    tracing::info!(
        file = %cli.file.display(),
        bytes = payload.len(),
        endpoint = %config.endpoint,
        "starting upload"
    );
    let handle = Arc::new(client.start(payload, options)?);

    let canceller = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let snapshot = canceller.snapshot();
            tracing::warn!(
                bytes = snapshot.bytes_accepted,
                percent = snapshot.percentage(),
                "interrupted, cancelling upload"
            );
            canceller.cancel();
        }
    });

    if let Some(mut events) = handle.take_events() {
        while let Some(event) = events.recv().await {
            match event {
                UploadEvent::Progress { percent } => tracing::info!(percent, "progress"),
                UploadEvent::ChunkComplete {
                    chunk_size,
                    bytes_accepted,
                    bytes_total,
                } => tracing::debug!(chunk_size, bytes_accepted, bytes_total, "chunk complete"),
                UploadEvent::Succeeded { .. } | UploadEvent::Failed { .. } => break,
            }
        }
    }

    match handle.wait().await {
        SessionOutcome::Succeeded { upload_url } => {
            tracing::info!(upload_url = %upload_url, "upload finished");
            Ok(upload_url)
        }
        SessionOutcome::Failed { message, .. } => anyhow::bail!("upload failed: {message}"),
        SessionOutcome::Aborted => anyhow::bail!("upload cancelled"),
    }
}
