//! Core types for docket sync: case model, document naming, change detection,
//! and incremental pagination. Everything here is pure; I/O lives in
//! `docket-store` and `docket-sync`.

pub mod change;
pub mod date;
pub mod model;
pub mod naming;
pub mod pagination;

pub use change::{Diff, HistoryEntry, classify, has_changes};
pub use date::{DateError, parse_source_date, yymmdd};
pub use model::{
    Anchor, Annex, Case, CaseSummary, Document, FetchOutcome, Litigant, ListedCase, Movement,
    RawAnnex, RawCaseDetail, RawMovement, SyncWatermark,
};
pub use naming::{annex_name, document_name, normalize_label};
pub use pagination::{Admitted, DEFAULT_PAGE_SIZE, PageDecision, PaginationCursor, page_indices};
