//! Sync layer: listing pagination, case reconciliation, concurrent document
//! ingestion and the recovery path for failed downloads.

mod config;
mod coordinator;
mod enumerate;
mod error;
mod fetch;
mod ingest;
mod recovery;
mod snapshot;
mod source;

#[cfg(feature = "http")]
pub mod http;

#[cfg(test)]
mod testing;

pub use config::SyncConfig;
pub use coordinator::{CaseOutcome, DocumentRef, Reconciler, RepairReport, RunOutcome, SyncReport};
pub use enumerate::{DocumentJob, DocumentKey, Enumerated, enumerate, stored_keys};
pub use error::{ExtractError, FetchError, SyncError};
pub use fetch::{FetchResponse, Fetcher};
pub use ingest::{
    DocumentIngestor, FailedDocument, FailureCause, FailureHandler, FailureLog, IngestReport,
    StorePull,
};
pub use recovery::{RecoveryReport, Rederived, recover, rederive};
pub use snapshot::{Snapshot, SnapshotSource};
pub use source::CaseSource;

#[cfg(feature = "http")]
pub use http::{HttpFetcher, HttpFetcherConfig};
