//! Extraction collaborator backed by a JSON snapshot.
//!
//! The browser layer that drives the court portal can dump what it saw into
//! one document; replaying it here runs the whole reconciliation without a
//! live session. Dates may use either ISO or the portal's `dd/mm/yyyy`.
//!
//! ```json
//! {
//!   "listing":  [{ "anchor": "a1", "rol": "C-1-2024", "admission": "04/03/2024" }],
//!   "details":  { "a1": { "summary": { ... }, "movements": [ ... ], "litigants": [ ... ] } },
//!   "annexes":  { "folder-ref": [{ "url": "...", "date": "05/03/2024", "reference": "Poder" }] },
//!   "lookups":  { "C-1-2024": ["a1"] }
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use docket_core::{Anchor, ListedCase, RawAnnex, RawCaseDetail};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{CaseSource, ExtractError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Listing rows, newest first.
    #[serde(default)]
    pub listing: Vec<ListedCase>,
    /// Detail views keyed by anchor.
    #[serde(default)]
    pub details: HashMap<String, RawCaseDetail>,
    /// Annex rows keyed by folder reference.
    #[serde(default)]
    pub annexes: HashMap<String, Vec<RawAnnex>>,
    /// Docket-code lookups; codes not present fall back to the listing.
    #[serde(default)]
    pub lookups: HashMap<String, Vec<Anchor>>,
}

pub struct SnapshotSource {
    snapshot: Snapshot,
}

impl SnapshotSource {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }

    pub fn from_json(json: &str) -> Result<Self, ExtractError> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub async fn load(path: &Path) -> Result<Self, ExtractError> {
        let json = tokio::fs::read_to_string(path).await?;
        let source = Self::from_json(&json)?;
        info!(
            path = %path.display(),
            listed = source.snapshot.listing.len(),
            details = source.snapshot.details.len(),
            "loaded snapshot"
        );
        Ok(source)
    }
}

#[async_trait]
impl CaseSource for SnapshotSource {
    async fn total_items(&mut self) -> Result<usize, ExtractError> {
        Ok(self.snapshot.listing.len())
    }

    async fn read_page(
        &mut self,
        page: u32,
        page_size: usize,
    ) -> Result<Vec<ListedCase>, ExtractError> {
        let listing = &self.snapshot.listing;
        if page == 0 || page_size == 0 {
            return Err(ExtractError::PageOutOfRange(page));
        }
        let start = (page as usize - 1) * page_size;
        if start >= listing.len() {
            return Err(ExtractError::PageOutOfRange(page));
        }
        let end = (start + page_size).min(listing.len());
        Ok(listing[start..end].to_vec())
    }

    async fn discover_anchors(&mut self, rol: &str) -> Result<Vec<Anchor>, ExtractError> {
        if let Some(anchors) = self.snapshot.lookups.get(rol) {
            return Ok(anchors.clone());
        }
        Ok(self
            .snapshot
            .listing
            .iter()
            .filter(|row| row.rol == rol)
            .map(|row| row.anchor.clone())
            .collect())
    }

    async fn materialize(&mut self, anchor: &Anchor) -> Result<RawCaseDetail, ExtractError> {
        self.snapshot
            .details
            .get(anchor.as_str())
            .cloned()
            .ok_or_else(|| ExtractError::UnknownAnchor(anchor.to_string()))
    }

    async fn extract_annexes(&mut self, folder: &str) -> Result<Vec<RawAnnex>, ExtractError> {
        self.snapshot
            .annexes
            .get(folder)
            .cloned()
            .ok_or_else(|| ExtractError::Annexes {
                folder: folder.to_string(),
                reason: "folder not in snapshot".into(),
            })
    }
}
