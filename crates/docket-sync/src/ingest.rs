//! Concurrent document ingestion.
//!
//! Jobs are dealt round-robin to a fixed number of workers spawned into a
//! [`JoinSet`]. Each worker walks its share in fixed-size batches: the
//! documents of one batch are fetched concurrently, and the worker pauses
//! between batches to stay under the upstream rate limit.
//!
//! Failures never cancel siblings. Each one is reported to the
//! [`FailureHandler`] and collected in the [`IngestReport`]. A worker that
//! panics keeps the documents it already settled; only its unfinished ones
//! are accounted as failed.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use docket_core::FetchOutcome;
use docket_store::{BlobStorage, CaseStore, StoreError};
use futures::FutureExt;
use futures::future::join_all;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::{DocumentJob, Fetcher, SyncConfig, SyncError};

/// Repair callback invoked once per failed document.
#[async_trait]
pub trait FailureHandler: Send + Sync {
    async fn on_failure(&self, case_id: &str, identity: &str) -> Result<(), StoreError>;
}

/// Why a document did not end up stored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureCause {
    #[error("upstream returned status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("blob write failed: {0}")]
    Storage(String),
    #[error("worker panicked")]
    WorkerPanicked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDocument {
    pub job: DocumentJob,
    pub cause: FailureCause,
}

/// Result of one ingestion pass. Ordering across workers is unspecified.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    /// Identities whose bytes were stored.
    pub stored: Vec<String>,
    pub failed: Vec<FailedDocument>,
}

/// Bounded worker pool fetching documents into blob storage.
pub struct DocumentIngestor {
    fetcher: Arc<dyn Fetcher>,
    blobs: Arc<dyn BlobStorage>,
    workers: usize,
    batch_size: usize,
    batch_delay: Duration,
}

impl DocumentIngestor {
    pub fn new(fetcher: Arc<dyn Fetcher>, blobs: Arc<dyn BlobStorage>, config: &SyncConfig) -> Self {
        Self {
            fetcher,
            blobs,
            workers: config.workers.max(1),
            batch_size: config.batch_size.max(1),
            batch_delay: config.batch_delay,
        }
    }

    pub fn blobs(&self) -> &dyn BlobStorage {
        self.blobs.as_ref()
    }

    /// Fetch every job, waiting for all of them before returning.
    ///
    /// Only an error from `handler` fails the call; fetch and storage
    /// failures are reported in the returned [`IngestReport`].
    pub async fn run(
        &self,
        jobs: Vec<DocumentJob>,
        handler: Arc<dyn FailureHandler>,
    ) -> Result<IngestReport, SyncError> {
        if jobs.is_empty() {
            return Ok(IngestReport::default());
        }
        let total = jobs.len();
        let workers = self.workers.min(total);
        let mut queues: Vec<Vec<DocumentJob>> = vec![Vec::new(); workers];
        for (i, job) in jobs.into_iter().enumerate() {
            queues[i % workers].push(job);
        }

        let mut set = JoinSet::new();
        for (worker, queue) in queues.into_iter().enumerate() {
            let fetcher = Arc::clone(&self.fetcher);
            let blobs = Arc::clone(&self.blobs);
            let handler = Arc::clone(&handler);
            let batch_size = self.batch_size;
            let batch_delay = self.batch_delay;
            set.spawn(async move {
                // Lives outside the worker future so settled jobs survive a panic.
                let progress = Mutex::new(WorkerOutcome::default());
                let work = run_worker(
                    worker,
                    &queue,
                    Pool {
                        fetcher: fetcher.as_ref(),
                        blobs: blobs.as_ref(),
                        handler: handler.as_ref(),
                        progress: &progress,
                    },
                    batch_size,
                    batch_delay,
                );
                if AssertUnwindSafe(work).catch_unwind().await.is_err() {
                    let unfinished = lock(&progress).unfinished(&queue);
                    error!(
                        worker,
                        assigned = queue.len(),
                        unfinished = unfinished.len(),
                        "document worker panicked"
                    );
                    for job in unfinished {
                        settle_failure(&progress, handler.as_ref(), job, FailureCause::WorkerPanicked)
                            .await;
                    }
                }
                progress.into_inner().unwrap_or_else(PoisonError::into_inner)
            });
        }

        let mut report = IngestReport::default();
        let mut handler_error = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => {
                    report.stored.extend(outcome.stored);
                    report.failed.extend(outcome.failed);
                    if handler_error.is_none() {
                        handler_error = outcome.handler_error;
                    }
                }
                Err(e) => error!(error = %e, "document worker aborted"),
            }
        }

        info!(
            total,
            workers,
            stored = report.stored.len(),
            failed = report.failed.len(),
            "ingestion finished"
        );
        match handler_error {
            Some(e) => Err(e.into()),
            None => Ok(report),
        }
    }
}

#[derive(Default)]
struct WorkerOutcome {
    stored: Vec<String>,
    failed: Vec<FailedDocument>,
    handler_error: Option<StoreError>,
    settled: HashSet<(String, String)>,
}

impl WorkerOutcome {
    fn mark_stored(&mut self, job: &DocumentJob) {
        self.settled
            .insert((job.case_id.clone(), job.identity.clone()));
        self.stored.push(job.identity.clone());
    }

    /// Jobs of `queue` that never reached a stored or failed state.
    fn unfinished(&self, queue: &[DocumentJob]) -> Vec<DocumentJob> {
        queue
            .iter()
            .filter(|job| {
                !self
                    .settled
                    .contains(&(job.case_id.clone(), job.identity.clone()))
            })
            .cloned()
            .collect()
    }
}

fn lock(progress: &Mutex<WorkerOutcome>) -> MutexGuard<'_, WorkerOutcome> {
    progress.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared handles one worker settles its jobs through.
#[derive(Clone, Copy)]
struct Pool<'a> {
    fetcher: &'a dyn Fetcher,
    blobs: &'a dyn BlobStorage,
    handler: &'a dyn FailureHandler,
    progress: &'a Mutex<WorkerOutcome>,
}

async fn run_worker(
    worker: usize,
    queue: &[DocumentJob],
    pool: Pool<'_>,
    batch_size: usize,
    batch_delay: Duration,
) {
    for (n, batch) in queue.chunks(batch_size).enumerate() {
        if n > 0 && !batch_delay.is_zero() {
            debug!(worker, delay = ?batch_delay, "pausing between batches");
            tokio::time::sleep(batch_delay).await;
        }
        join_all(batch.iter().map(|job| settle(pool, job))).await;
    }
}

/// Fetch one job and record its final state before returning.
async fn settle(pool: Pool<'_>, job: &DocumentJob) {
    match process(pool.fetcher, pool.blobs, job).await {
        Ok(()) => lock(pool.progress).mark_stored(job),
        Err(cause) => settle_failure(pool.progress, pool.handler, job.clone(), cause).await,
    }
}

async fn settle_failure(
    progress: &Mutex<WorkerOutcome>,
    handler: &dyn FailureHandler,
    job: DocumentJob,
    cause: FailureCause,
) {
    warn!(
        case = %job.case_id,
        identity = %job.identity,
        cause = %cause,
        "document failed"
    );
    let handled = handler.on_failure(&job.case_id, &job.identity).await;
    let mut outcome = lock(progress);
    if let Err(e) = handled {
        error!(case = %job.case_id, identity = %job.identity, error = %e, "failure handler errored");
        outcome.handler_error.get_or_insert(e);
    }
    outcome
        .settled
        .insert((job.case_id.clone(), job.identity.clone()));
    outcome.failed.push(FailedDocument { job, cause });
}

async fn process(
    fetcher: &dyn Fetcher,
    blobs: &dyn BlobStorage,
    job: &DocumentJob,
) -> Result<(), FailureCause> {
    let response = fetcher
        .fetch(&job.url)
        .await
        .map_err(|e| FailureCause::Transport(e.to_string()))?;
    match response.into_outcome() {
        FetchOutcome::Success(bytes) => {
            blobs
                .store(&job.case_id, &job.identity, &bytes)
                .await
                .map_err(|e| FailureCause::Storage(e.to_string()))?;
            debug!(case = %job.case_id, identity = %job.identity, size = bytes.len(), "document stored");
            Ok(())
        }
        FetchOutcome::Failure(status) => Err(FailureCause::Status(status)),
    }
}

/// Records failures so the caller can prune them from a case it has not
/// written yet.
#[derive(Debug, Default)]
pub struct FailureLog {
    entries: Mutex<Vec<(String, String)>>,
}

impl FailureLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Failed identities for one case, in report order, without repeats.
    pub fn identities(&self, case_id: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.entries()
            .iter()
            .filter(|(case, _)| case == case_id)
            .filter(|(_, id)| seen.insert(id.clone()))
            .map(|(_, id)| id.clone())
            .collect()
    }

    /// Forget a failure that was recovered.
    pub fn resolve(&self, case_id: &str, identity: &str) {
        self.entries()
            .retain(|(case, id)| !(case == case_id && id == identity));
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> MutexGuard<'_, Vec<(String, String)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl FailureHandler for FailureLog {
    async fn on_failure(&self, case_id: &str, identity: &str) -> Result<(), StoreError> {
        self.entries()
            .push((case_id.to_string(), identity.to_string()));
        Ok(())
    }
}

/// Pulls each failed identity from the persisted case.
pub struct StorePull {
    store: Arc<dyn CaseStore>,
}

impl StorePull {
    pub fn new(store: Arc<dyn CaseStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl FailureHandler for StorePull {
    async fn on_failure(&self, case_id: &str, identity: &str) -> Result<(), StoreError> {
        let removed = self.store.pull_document(case_id, identity).await?;
        info!(case = case_id, identity, removed, "pulled dangling document");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Scripted, ScriptedFetcher, job};
    use docket_store::MemoryBlobStore;
    use std::time::Instant;

    fn ingestor(
        fetcher: &Arc<ScriptedFetcher>,
        blobs: &MemoryBlobStore,
        config: SyncConfig,
    ) -> DocumentIngestor {
        DocumentIngestor::new(
            Arc::clone(fetcher) as Arc<dyn Fetcher>,
            Arc::new(blobs.clone()),
            &config.with_batch_delay(Duration::ZERO),
        )
    }

    fn five_jobs() -> Vec<DocumentJob> {
        (1..=5).map(|i| job("C-1-2024", &format!("doc_{i}"))).collect()
    }

    #[tokio::test]
    async fn one_404_among_five() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.script("url/doc_3", Scripted::Status(404));
        let blobs = MemoryBlobStore::new();
        let log = Arc::new(FailureLog::new());

        let report = ingestor(&fetcher, &blobs, SyncConfig::default())
            .run(five_jobs(), log.clone())
            .await
            .unwrap();

        assert_eq!(blobs.len(), 4);
        assert_eq!(report.stored.len(), 4);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].job.identity, "doc_3");
        assert_eq!(report.failed[0].cause, FailureCause::Status(404));
        assert_eq!(log.len(), 1);
        assert_eq!(log.identities("C-1-2024"), vec!["doc_3".to_string()]);
        assert_eq!(blobs.get("C-1-2024", "doc_1"), Some(b"url/doc_1".to_vec()));
    }

    #[tokio::test]
    async fn transport_and_storage_failures_are_reported() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.script("url/doc_1", Scripted::Transport);
        let blobs = MemoryBlobStore::new();
        blobs.fail_on("doc_2");
        let log = Arc::new(FailureLog::new());

        let report = ingestor(&fetcher, &blobs, SyncConfig::default())
            .run(five_jobs(), log.clone())
            .await
            .unwrap();

        assert_eq!(report.stored.len(), 3);
        let mut causes: Vec<(String, bool)> = report
            .failed
            .iter()
            .map(|f| {
                (
                    f.job.identity.clone(),
                    matches!(f.cause, FailureCause::Transport(_)),
                )
            })
            .collect();
        causes.sort();
        assert_eq!(
            causes,
            vec![("doc_1".to_string(), true), ("doc_2".to_string(), false)]
        );
        assert_eq!(log.len(), 2);
    }

    #[tokio::test]
    async fn concurrency_is_bounded_by_workers_and_batch() {
        let fetcher = Arc::new(ScriptedFetcher::default().with_latency(Duration::from_millis(20)));
        let blobs = MemoryBlobStore::new();
        let jobs: Vec<DocumentJob> = (0..12).map(|i| job("C-1-2024", &format!("d{i}"))).collect();

        let config = SyncConfig::default().with_workers(2).with_batch_size(3);
        let report = ingestor(&fetcher, &blobs, config)
            .run(jobs, Arc::new(FailureLog::new()))
            .await
            .unwrap();

        assert_eq!(report.stored.len(), 12);
        assert!(fetcher.max_in_flight() <= 6, "max {}", fetcher.max_in_flight());
        assert!(fetcher.max_in_flight() >= 2);
    }

    #[tokio::test]
    async fn worker_pauses_between_batches() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let blobs = MemoryBlobStore::new();
        let jobs: Vec<DocumentJob> = (0..3).map(|i| job("C-1-2024", &format!("d{i}"))).collect();
        let config = SyncConfig::default()
            .with_workers(1)
            .with_batch_size(1)
            .with_batch_delay(Duration::from_millis(25));
        let ingestor = DocumentIngestor::new(fetcher, Arc::new(blobs.clone()), &config);

        let started = Instant::now();
        ingestor
            .run(jobs, Arc::new(FailureLog::new()))
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(blobs.len(), 3);
    }

    #[tokio::test]
    async fn panicking_worker_does_not_cancel_siblings() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.script("url/d0", Scripted::Panic);
        let blobs = MemoryBlobStore::new();
        let log = Arc::new(FailureLog::new());
        let jobs: Vec<DocumentJob> = (0..4).map(|i| job("C-1-2024", &format!("d{i}"))).collect();

        // Two workers: d0 and d2 share the panicking worker.
        let config = SyncConfig::default().with_workers(2);
        let report = ingestor(&fetcher, &blobs, config)
            .run(jobs, log.clone())
            .await
            .unwrap();

        let mut stored = report.stored.clone();
        stored.sort();
        assert_eq!(stored, vec!["d1".to_string(), "d3".to_string()]);
        assert!(
            report
                .failed
                .iter()
                .all(|f| f.cause == FailureCause::WorkerPanicked)
        );
        let mut failed = log.identities("C-1-2024");
        failed.sort();
        assert_eq!(failed, vec!["d0".to_string(), "d2".to_string()]);
    }

    #[tokio::test]
    async fn panic_keeps_documents_settled_before_it() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.script("url/d1", Scripted::Panic);
        fetcher.script("url/d0b", Scripted::Status(404));
        let blobs = MemoryBlobStore::new();
        let log = Arc::new(FailureLog::new());
        let jobs = vec![
            job("C-1-2024", "d0"),
            job("C-1-2024", "d0b"),
            job("C-1-2024", "d1"),
            job("C-1-2024", "d2"),
        ];

        let config = SyncConfig::default().with_workers(1).with_batch_size(1);
        let report = ingestor(&fetcher, &blobs, config)
            .run(jobs, log.clone())
            .await
            .unwrap();

        assert_eq!(report.stored, vec!["d0".to_string()]);
        assert!(blobs.get("C-1-2024", "d0").is_some());
        let causes: Vec<(&str, &FailureCause)> = report
            .failed
            .iter()
            .map(|f| (f.job.identity.as_str(), &f.cause))
            .collect();
        assert_eq!(
            causes,
            vec![
                ("d0b", &FailureCause::Status(404)),
                ("d1", &FailureCause::WorkerPanicked),
                ("d2", &FailureCause::WorkerPanicked),
            ]
        );
        // The 404 reaches the handler once; the stored document never does.
        assert_eq!(
            log.identities("C-1-2024"),
            vec!["d0b".to_string(), "d1".to_string(), "d2".to_string()]
        );
        assert_eq!(log.len(), 3);
    }

    #[tokio::test]
    async fn handler_error_propagates_after_all_documents() {
        struct Broken;
        #[async_trait]
        impl FailureHandler for Broken {
            async fn on_failure(&self, case_id: &str, _: &str) -> Result<(), StoreError> {
                Err(StoreError::NotFound(case_id.to_string()))
            }
        }

        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.script("url/doc_2", Scripted::Status(500));
        let blobs = MemoryBlobStore::new();
        let result = ingestor(&fetcher, &blobs, SyncConfig::default())
            .run(five_jobs(), Arc::new(Broken))
            .await;

        assert!(matches!(result, Err(SyncError::Store(StoreError::NotFound(_)))));
        assert_eq!(blobs.len(), 4);
    }

    #[tokio::test]
    async fn empty_job_list_is_a_no_op() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let blobs = MemoryBlobStore::new();
        let report = ingestor(&fetcher, &blobs, SyncConfig::default())
            .run(Vec::new(), Arc::new(FailureLog::new()))
            .await
            .unwrap();
        assert!(report.stored.is_empty() && report.failed.is_empty());
        assert_eq!(fetcher.calls().len(), 0);
    }

    #[tokio::test]
    async fn store_pull_removes_identity_from_persisted_case() {
        use docket_store::MemoryStore;

        let case = crate::testing::stored_case_with_annex();
        let rol = case.rol.clone();
        let store = MemoryStore::with_cases([case]);
        let handler = StorePull::new(Arc::new(store.clone()));
        handler
            .on_failure(&rol, "escrito_demanda_240305_poder_anexo")
            .await
            .unwrap();
        // Repeating the pull is harmless.
        handler
            .on_failure(&rol, "escrito_demanda_240305_poder_anexo")
            .await
            .unwrap();
        assert_eq!(store.get(&rol).unwrap().document_count(), 2);
        assert_eq!(store.writes().pulls, 1);
    }

    #[test]
    fn failure_log_resolves_recovered_entries() {
        let log = FailureLog::new();
        futures::executor::block_on(async {
            log.on_failure("C-1", "a").await.unwrap();
            log.on_failure("C-1", "b").await.unwrap();
            log.on_failure("C-2", "a").await.unwrap();
        });
        log.resolve("C-1", "a");
        assert_eq!(log.identities("C-1"), vec!["b".to_string()]);
        assert_eq!(log.identities("C-2"), vec!["a".to_string()]);
    }
}
