use std::time::Duration;

use docket_core::DEFAULT_PAGE_SIZE;

/// Tuning knobs for a reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Rows per listing page.
    pub page_size: usize,
    /// Concurrent document workers.
    pub workers: usize,
    /// Documents fetched together by one worker before pausing.
    pub batch_size: usize,
    /// Pause between a worker's batches.
    pub batch_delay: Duration,
    /// Re-extract and retry failed documents once before pruning them.
    pub recovery: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            workers: 4,
            batch_size: 10,
            batch_delay: Duration::from_secs(3),
            recovery: true,
        }
    }
}

impl SyncConfig {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_batch_delay(mut self, batch_delay: Duration) -> Self {
        self.batch_delay = batch_delay;
        self
    }

    pub fn with_recovery(mut self, recovery: bool) -> Self {
        self.recovery = recovery;
        self
    }
}
