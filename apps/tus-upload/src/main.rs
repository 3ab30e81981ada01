use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tuskit::{
    ClientConfig, FileSource, Fingerprint, MemoryStore, PropertiesStore, TusClient, UploadSource,
    UrlStore,
};

/// Uploads a file to a tus server, resuming where a previous run stopped.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// File to upload.
    file: PathBuf,

    /// TOML client configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Upload endpoint; overrides the configuration file.
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Properties file remembering upload locations. Without it nothing is
    /// remembered across runs.
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Fingerprint the file by content instead of path and size.
    #[arg(long)]
    content_fingerprint: bool,

    /// Chunk size in bytes.
    #[arg(long)]
    chunk_size: Option<usize>,
}

fn client_config(args: &Args) -> anyhow::Result<ClientConfig> {
    let mut config = match (&args.config, &args.endpoint) {
        (Some(path), _) => ClientConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        (None, Some(endpoint)) => ClientConfig::new(endpoint),
        (None, None) => anyhow::bail!("either --config or --endpoint is required"),
    };
    if let Some(endpoint) = &args.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(chunk_size) = args.chunk_size {
        config.chunk_size = chunk_size;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = client_config(&args)?;

    let store: Arc<dyn UrlStore> = match &args.store {
        Some(path) => Arc::new(
            PropertiesStore::open(path)
                .with_context(|| format!("failed to open store {}", path.display()))?,
        ),
        None => Arc::new(MemoryStore::new()),
    };
    let client = TusClient::new(config)?.with_resuming(store);

    let strategy = if args.content_fingerprint {
        Fingerprint::ContentSha256
    } else {
        Fingerprint::PathAndSize
    };
    let mut source = FileSource::open_with(&args.file, strategy)
        .await
        .with_context(|| format!("failed to open {}", args.file.display()))?;
    let size = source.size();

    let mut uploader = client.resume_or_create_upload(&mut source).await?;
    tracing::info!(url = %uploader.upload_url(), offset = uploader.offset(), size, "uploading");

    while uploader.upload_chunk().await?.is_some() {
        tracing::debug!(offset = uploader.offset(), size, "progress");
    }
    uploader.finish().await?;

    println!("{}", uploader.upload_url());
    Ok(())
}
