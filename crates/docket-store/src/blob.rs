//! Document blob storage.
//!
//! Blobs are addressed by `(case_id, identity)`: the docket code of the owning
//! case and the document's deterministic name. The filesystem layout is
//! `{root}/{case_id}/{identity}.{ext}`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use crate::StoreError;

#[async_trait]
pub trait BlobStorage: Send + Sync {
    async fn store(&self, case_id: &str, identity: &str, bytes: &[u8]) -> Result<(), StoreError>;

    async fn exists(&self, case_id: &str, identity: &str) -> Result<bool, StoreError>;
}

/// Reject keys that could escape their directory.
fn check_key(key: &str) -> Result<(), StoreError> {
    let bad = key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\', '\0']);
    if bad {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Local-disk blob store.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    extension: String,
}

impl FsBlobStore {
    /// Store blobs under `root` with the default `pdf` extension.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extension: "pdf".into(),
        }
    }

    /// Use `extension` (without the dot) for stored files; empty means none.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a blob is (or would be) stored at.
    pub fn path_for(&self, case_id: &str, identity: &str) -> Result<PathBuf, StoreError> {
        check_key(case_id)?;
        check_key(identity)?;
        let file = if self.extension.is_empty() {
            identity.to_string()
        } else {
            format!("{identity}.{}", self.extension)
        };
        Ok(self.root.join(case_id).join(file))
    }
}

#[async_trait]
impl BlobStorage for FsBlobStore {
    async fn store(&self, case_id: &str, identity: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(case_id, identity)?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        // Write-then-rename so `exists` never observes a partial file.
        let mut partial = path.clone().into_os_string();
        partial.push(".part");
        tokio::fs::write(&partial, bytes).await?;
        tokio::fs::rename(&partial, &path).await?;
        debug!(path = %path.display(), size = bytes.len(), "stored blob");
        Ok(())
    }

    async fn exists(&self, case_id: &str, identity: &str) -> Result<bool, StoreError> {
        let path = self.path_for(case_id, identity)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}

#[derive(Debug, Default)]
struct MemoryBlobs {
    blobs: HashMap<(String, String), Vec<u8>>,
    failing: HashSet<String>,
}

/// In-memory blob store. Clones share the same state.
///
/// Identities registered with [`fail_on`](Self::fail_on) make `store` return
/// an I/O error, for exercising write-failure paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    inner: Arc<Mutex<MemoryBlobs>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, identity: impl Into<String>) {
        self.state().failing.insert(identity.into());
    }

    pub fn get(&self, case_id: &str, identity: &str) -> Option<Vec<u8>> {
        self.state()
            .blobs
            .get(&(case_id.to_string(), identity.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.state().blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored identities for one case, sorted.
    pub fn identities(&self, case_id: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .state()
            .blobs
            .keys()
            .filter(|(case, _)| case == case_id)
            .map(|(_, id)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn state(&self) -> MutexGuard<'_, MemoryBlobs> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl BlobStorage for MemoryBlobStore {
    async fn store(&self, case_id: &str, identity: &str, bytes: &[u8]) -> Result<(), StoreError> {
        check_key(case_id)?;
        check_key(identity)?;
        let mut state = self.state();
        if state.failing.contains(identity) {
            return Err(StoreError::Io(std::io::Error::other(format!(
                "simulated write failure for {identity}"
            ))));
        }
        state
            .blobs
            .insert((case_id.to_string(), identity.to_string()), bytes.to_vec());
        Ok(())
    }

    async fn exists(&self, case_id: &str, identity: &str) -> Result<bool, StoreError> {
        Ok(self.get(case_id, identity).is_some())
    }
}
