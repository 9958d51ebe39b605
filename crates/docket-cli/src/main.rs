use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use docket_store::{DuckStore, FsBlobStore};
use docket_sync::{
    DocumentIngestor, HttpFetcher, HttpFetcherConfig, Reconciler, RepairReport, RunOutcome,
    SnapshotSource, SyncConfig,
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod display;

#[derive(Parser)]
#[command(name = "docket", version, about = "Incremental sync of civil case records and court filings")]
struct Cli {
    /// DuckDB case database (created if missing).
    #[arg(long, env = "DOCKET_DB", default_value = "docket.duckdb")]
    db: PathBuf,

    /// Root directory for downloaded documents.
    #[arg(long, env = "DOCKET_DOCUMENTS", default_value = "documents")]
    documents: PathBuf,

    /// JSON snapshot produced by the browser extraction layer.
    #[arg(long, env = "DOCKET_SNAPSHOT")]
    snapshot: PathBuf,

    /// Base URL for relative document links.
    #[arg(long, env = "DOCKET_BASE_URL")]
    base_url: Option<String>,

    /// Concurrent document workers.
    #[arg(long, env = "DOCKET_WORKERS", default_value_t = 4)]
    workers: usize,

    /// Documents fetched together by one worker.
    #[arg(long, env = "DOCKET_BATCH_SIZE", default_value_t = 10)]
    batch_size: usize,

    /// Pause between a worker's batches, in milliseconds.
    #[arg(long, env = "DOCKET_BATCH_DELAY_MS", default_value_t = 3000)]
    batch_delay_ms: u64,

    /// Listing rows per page.
    #[arg(long, env = "DOCKET_PAGE_SIZE", default_value_t = 15)]
    page_size: usize,

    /// Skip the re-extraction retry for failed documents.
    #[arg(long, env = "DOCKET_NO_RECOVERY")]
    no_recovery: bool,

    /// Per-request timeout, in seconds.
    #[arg(long, env = "DOCKET_TIMEOUT_SECS", default_value_t = 60)]
    timeout_secs: u64,

    /// Extra attempts after a transport error or 5xx.
    #[arg(long, env = "DOCKET_RETRIES", default_value_t = 2)]
    retries: u32,

    /// File extension for stored documents.
    #[arg(long, env = "DOCKET_EXTENSION", default_value = "pdf")]
    extension: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Walk the listing feed down to the stored watermark and reconcile new cases.
    SyncListing,
    /// Look up one docket code and reconcile it.
    SyncCase {
        /// Docket code, e.g. C-2622-2024.
        rol: String,
    },
    /// Re-fetch missing documents of a stored case, pulling those that cannot be acquired.
    Repair {
        /// Docket code, e.g. C-2622-2024.
        rol: String,
    },
}

impl Cli {
    fn sync_config(&self) -> SyncConfig {
        SyncConfig::default()
            .with_page_size(self.page_size)
            .with_workers(self.workers)
            .with_batch_size(self.batch_size)
            .with_batch_delay(Duration::from_millis(self.batch_delay_ms))
            .with_recovery(!self.no_recovery)
    }

    fn fetcher_config(&self) -> HttpFetcherConfig {
        HttpFetcherConfig {
            base_url: self.base_url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            retries: self.retries,
            ..HttpFetcherConfig::default()
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    tracing::info!("docket v{}", env!("CARGO_PKG_VERSION"));

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting runtime")
        .and_then(|runtime| runtime.block_on(run(cli)));

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    let config = cli.sync_config();
    let store = DuckStore::open_persistent(&cli.db)
        .with_context(|| format!("opening case store {}", cli.db.display()))?;
    let blobs = FsBlobStore::new(&cli.documents).with_extension(cli.extension.as_str());
    tracing::info!(db = %cli.db.display(), documents = %blobs.root().display(), "stores ready");
    let fetcher = HttpFetcher::new(cli.fetcher_config()).context("building HTTP client")?;
    let source = SnapshotSource::load(&cli.snapshot)
        .await
        .with_context(|| format!("loading snapshot {}", cli.snapshot.display()))?;

    let ingestor = DocumentIngestor::new(Arc::new(fetcher), Arc::new(blobs), &config);
    let mut reconciler = Reconciler::new(Box::new(source), Arc::new(store), ingestor, config);

    match cli.command {
        Command::SyncListing => {
            let outcome = reconciler.sync_listing().await.context("listing sync")?;
            display::print_run(&outcome);
            Ok(run_exit_code(&outcome))
        }
        Command::SyncCase { rol } => {
            let outcome = reconciler
                .sync_case(&rol)
                .await
                .with_context(|| format!("syncing {rol}"))?;
            display::print_run(&outcome);
            Ok(run_exit_code(&outcome))
        }
        Command::Repair { rol } => {
            let report = reconciler
                .repair_case(&rol)
                .await
                .with_context(|| format!("repairing {rol}"))?;
            display::print_repair(&report);
            Ok(repair_exit_code(&report))
        }
    }
}

/// 0 completed, 2 partial failure, 3 no new data, 4 no anchors.
fn run_exit_code(outcome: &RunOutcome) -> u8 {
    match outcome {
        RunOutcome::Completed(_) => 0,
        RunOutcome::PartialFailure(_) => 2,
        RunOutcome::NoNewData(_) => 3,
        RunOutcome::NoAnchors => 4,
    }
}

fn repair_exit_code(report: &RepairReport) -> u8 {
    if report.pulled.is_empty() { 0 } else { 2 }
}
