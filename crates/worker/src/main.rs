use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use mediavault_core::media_tool::MediaToolLock;
use mediavault_downloader::decoder::{DirectUrlDecoder, HttpUrlDecoder, UrlDecoder};
use mediavault_downloader::rate_limit::IntervalTokenBucket;
use mediavault_downloader::DownloadManager;
use mediavault_library::duplicates::DuplicateCalculator;
use mediavault_library::fs_store::FsMetadataStore;
use mediavault_library::{MediaLibrary, MetadataStore};
use mediavault_worker::{AppConfig, Cli, Command, LibraryIngest};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "mediavault_worker=debug,mediavault_downloader=debug,mediavault_library=info,mediavault_core=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = AppConfig::from_env();
    tracing::info!(
        library = %config.media_library_path.display(),
        workers = config.download_workers,
        decoders = config.url_decoder_endpoints.len(),
        "Loaded worker configuration",
    );

    // --- Library ---
    let store: Arc<dyn MetadataStore> = Arc::new(FsMetadataStore::new(&config.media_library_path));
    let library = Arc::new(MediaLibrary::new(
        &config.media_library_path,
        Arc::clone(&store),
        MediaToolLock::default(),
    ));

    match cli.into_command() {
        Command::Run { urls } => run(config, store, library, urls).await,
        Command::Duplicates => print_duplicates(library).await,
        Command::EnsureHashes => ensure_hashes(&library).await,
        Command::Thumbnails { id } => generate_thumbnails(&library, &id).await,
    }
}

/// Run the download queue until SIGINT or SIGTERM, queueing `urls` first.
async fn run(
    config: AppConfig,
    store: Arc<dyn MetadataStore>,
    library: Arc<MediaLibrary>,
    urls: Vec<String>,
) -> anyhow::Result<()> {
    if config.ensure_hashes_on_start {
        ensure_hashes(&library).await?;
    }

    // --- URL decoders ---
    let limiter_cancel = CancellationToken::new();
    let decoder: Arc<dyn UrlDecoder> = if config.url_decoder_endpoints.is_empty() {
        tracing::warn!("No URL decoder endpoints configured, treating URLs as direct links");
        Arc::new(DirectUrlDecoder)
    } else {
        let limiter = IntervalTokenBucket::spawn(config.request_token_interval(), limiter_cancel.clone());
        Arc::new(
            HttpUrlDecoder::new(config.url_decoder_endpoints.clone(), limiter)
                .context("Failed to build URL decoder client")?,
        )
    };

    // --- Download manager ---
    let ingest = Arc::new(LibraryIngest::new(Arc::clone(&library), Arc::clone(&decoder)));
    let manager = DownloadManager::start(config.downloader(), store, decoder, ingest)
        .context("Failed to start download manager")?;

    let restored = manager.restore_queue().await;
    tracing::info!(restored, "Download queue ready");

    for url in &urls {
        let outcome = manager.enqueue_url(url).await;
        tracing::info!(origin_url = %url, outcome = ?outcome, "Queued from command line");
    }

    shutdown_signal().await;

    // --- Shutdown ---
    if let Err(e) = manager.shutdown().await {
        tracing::error!(error = %e, "Failed to persist download queue");
    }
    limiter_cancel.cancel();

    tracing::info!("Worker stopped");
    Ok(())
}

async fn print_duplicates(library: Arc<MediaLibrary>) -> anyhow::Result<()> {
    let matches = DuplicateCalculator::new(library)
        .calculate()
        .await
        .context("Duplicate calculation failed")?;
    println!("{}", serde_json::to_string_pretty(&matches)?);
    Ok(())
}

async fn ensure_hashes(library: &MediaLibrary) -> anyhow::Result<()> {
    let report = library.ensure_hashes().await.context("Hash check failed")?;
    tracing::info!(
        present = report.present,
        generated = report.generated,
        missing_video = report.missing_video,
        failed = report.failed,
        "Hash check finished",
    );
    Ok(())
}

async fn generate_thumbnails(library: &MediaLibrary, id: &str) -> anyhow::Result<()> {
    if library.find(id).await?.is_none() {
        anyhow::bail!("No library entry with id {id}");
    }
    library
        .generate_thumbnails(id)
        .await
        .with_context(|| format!("Thumbnail generation failed for {id}"))?;
    for thumb in library.thumbnails(id).await? {
        println!("{}", thumb.display());
    }
    Ok(())
}

/// Wait for SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
