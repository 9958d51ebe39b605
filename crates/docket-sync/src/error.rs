use docket_core::Anchor;
use docket_store::StoreError;
use thiserror::Error;

/// Failure of the extraction collaborator.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unknown anchor: {0}")]
    UnknownAnchor(String),

    #[error("listing page {0} is out of range")]
    PageOutOfRange(u32),

    #[error("folder lookup failed for {folder}: {reason}")]
    Annexes { folder: String, reason: String },

    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Transport-level failure of the fetch collaborator. Non-200 statuses are
/// not errors; they come back as a response.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid document URL: {0}")]
    InvalidUrl(String),

    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors surfaced by the reconciliation coordinator.
///
/// Fetch failures never appear here; they are accounted for in the run
/// report. Store errors propagate unchanged.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("extraction failed for {anchor}: {source}")]
    Extraction {
        anchor: Anchor,
        #[source]
        source: ExtractError,
    },

    /// Listing or lookup could not be read; no case was attempted.
    #[error("case discovery failed: {0}")]
    Discovery(#[source] ExtractError),

    #[error("case {0} is not stored")]
    UnknownCase(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    pub(crate) fn extraction(anchor: &Anchor, source: ExtractError) -> Self {
        Self::Extraction {
            anchor: anchor.clone(),
            source,
        }
    }
}
