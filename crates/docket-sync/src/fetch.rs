//! Fetch collaborator.

use async_trait::async_trait;
use docket_core::FetchOutcome;

use crate::FetchError;

/// Raw response to a document request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub bytes: Vec<u8>,
}

impl FetchResponse {
    pub fn ok(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            bytes: bytes.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            bytes: Vec::new(),
        }
    }

    pub fn into_outcome(self) -> FetchOutcome {
        FetchOutcome::from_response(self.status, self.bytes)
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Issue one request. `Err` means the request never produced a status.
    async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError>;
}
