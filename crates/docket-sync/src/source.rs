//! Extraction collaborator.

use async_trait::async_trait;
use docket_core::{Anchor, ListedCase, RawAnnex, RawCaseDetail};

use crate::ExtractError;

/// Producer of typed case records.
///
/// The upstream holds a single stateful session, so every method takes
/// `&mut self` and calls are never issued concurrently.
#[async_trait]
pub trait CaseSource: Send {
    /// Number of rows in the listing feed.
    async fn total_items(&mut self) -> Result<usize, ExtractError>;

    /// Rows of one 1-based listing page, newest first.
    async fn read_page(&mut self, page: u32, page_size: usize)
    -> Result<Vec<ListedCase>, ExtractError>;

    /// Anchors returned by a single docket-code lookup.
    async fn discover_anchors(&mut self, rol: &str) -> Result<Vec<Anchor>, ExtractError>;

    /// Full detail view behind an anchor.
    async fn materialize(&mut self, anchor: &Anchor) -> Result<RawCaseDetail, ExtractError>;

    /// Annex rows behind a movement's folder reference.
    async fn extract_annexes(&mut self, folder: &str) -> Result<Vec<RawAnnex>, ExtractError>;
}
