//! Incremental pagination over a listing feed.
//!
//! The feed is sorted newest-first within a page, but ordering across pages
//! is not strictly monotonic, so the decision is taken per page against the
//! watermark rather than by stopping at the first older row.

use chrono::NaiveDate;

use crate::model::{Case, ListedCase, SyncWatermark};

/// Rows per listing page on the source.
pub const DEFAULT_PAGE_SIZE: usize = 15;

/// 1-based page numbers needed to cover `total_items`.
pub fn page_indices(total_items: usize, page_size: usize) -> Vec<u32> {
    if page_size == 0 {
        return Vec::new();
    }
    let pages = total_items.div_ceil(page_size);
    (1..=pages as u32).collect()
}

/// Anything carrying an admission date.
pub trait Admitted {
    fn admission(&self) -> NaiveDate;
}

impl Admitted for ListedCase {
    fn admission(&self) -> NaiveDate {
        self.admission
    }
}

impl Admitted for Case {
    fn admission(&self) -> NaiveDate {
        self.admission
    }
}

impl Admitted for SyncWatermark {
    fn admission(&self) -> NaiveDate {
        self.admission
    }
}

/// What to do after reading one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageDecision<T> {
    /// Keep walking pages, accumulating the whole batch.
    pub continue_paging: bool,
    /// Rows strictly newer than the watermark; set only when paging stops.
    pub new_records: Vec<T>,
}

/// Decides continuation for a listing sync. The watermark is read once at
/// the start of the run and never changes mid-run.
#[derive(Debug, Clone, Default)]
pub struct PaginationCursor {
    watermark: Option<SyncWatermark>,
}

impl PaginationCursor {
    pub fn new(watermark: Option<SyncWatermark>) -> Self {
        Self { watermark }
    }

    pub fn watermark(&self) -> Option<&SyncWatermark> {
        self.watermark.as_ref()
    }

    /// Decide on a freshly read batch.
    ///
    /// - No watermark: continue, nothing filtered.
    /// - Watermark, no row strictly newer: continue.
    /// - Watermark, some rows strictly newer: stop after this batch, keeping
    ///   only the newer rows.
    pub fn decide<T: Admitted + Clone>(&self, batch: &[T]) -> PageDecision<T> {
        let Some(watermark) = &self.watermark else {
            return PageDecision {
                continue_paging: true,
                new_records: Vec::new(),
            };
        };

        let newer: Vec<T> = batch
            .iter()
            .filter(|r| r.admission() > watermark.admission)
            .cloned()
            .collect();

        PageDecision {
            continue_paging: newer.is_empty(),
            new_records: newer,
        }
    }
}
