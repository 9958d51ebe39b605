//! Storage layer: case persistence (in-memory, DuckDB) and document blobs
//! (filesystem, in-memory).

use async_trait::async_trait;
use docket_core::{Case, SyncWatermark};

mod blob;
mod error;
mod memory;

pub use blob::{BlobStorage, FsBlobStore, MemoryBlobStore};
pub use error::StoreError;
pub use memory::{MemoryStore, WriteCounts};

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::DuckStore;

#[cfg(test)]
mod fixtures;

/// Persisted case records, keyed by docket code.
///
/// Every write is scoped to a single case; there are no cross-case
/// transactions. `pull_document` must be idempotent so concurrent repairs
/// against the same case can land in any order.
#[async_trait]
pub trait CaseStore: Send + Sync {
    async fn find(&self, rol: &str) -> Result<Option<Case>, StoreError>;

    /// Store a case seen for the first time. Fails with
    /// [`StoreError::Duplicate`] if the docket code is already stored.
    async fn insert(&self, case: &Case) -> Result<(), StoreError>;

    /// Overwrite a stored case wholesale. Fails with
    /// [`StoreError::NotFound`] if nothing is stored under `rol`.
    async fn replace(&self, rol: &str, case: &Case) -> Result<(), StoreError>;

    /// Remove a document or annex identity from the stored case.
    ///
    /// Returns the number of references removed (zero if already absent).
    async fn pull_document(&self, rol: &str, identity: &str) -> Result<usize, StoreError>;

    /// Most recently admitted stored case, used to bound listing syncs.
    async fn watermark(&self) -> Result<Option<SyncWatermark>, StoreError>;
}
