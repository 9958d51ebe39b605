//! In-memory case store with write accounting.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use docket_core::{Case, SyncWatermark};
use tracing::debug;

use crate::{CaseStore, StoreError};

/// Writes applied to a [`MemoryStore`] since it was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteCounts {
    pub inserts: usize,
    pub replaces: usize,
    /// Pulls that actually removed a reference.
    pub pulls: usize,
}

#[derive(Debug, Default)]
struct MemoryState {
    cases: HashMap<String, Case>,
    writes: WriteCounts,
}

/// `HashMap`-backed [`CaseStore`]. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store without counting the seed as writes.
    pub fn with_cases(cases: impl IntoIterator<Item = Case>) -> Self {
        let store = Self::new();
        {
            let mut state = store.state();
            for case in cases {
                state.cases.insert(case.rol.clone(), case);
            }
        }
        store
    }

    pub fn get(&self, rol: &str) -> Option<Case> {
        self.state().cases.get(rol).cloned()
    }

    pub fn len(&self) -> usize {
        self.state().cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn writes(&self) -> WriteCounts {
        self.state().writes
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CaseStore for MemoryStore {
    async fn find(&self, rol: &str) -> Result<Option<Case>, StoreError> {
        Ok(self.get(rol))
    }

    async fn insert(&self, case: &Case) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.cases.contains_key(&case.rol) {
            return Err(StoreError::Duplicate(case.rol.clone()));
        }
        state.cases.insert(case.rol.clone(), case.clone());
        state.writes.inserts += 1;
        debug!(rol = %case.rol, "inserted case");
        Ok(())
    }

    async fn replace(&self, rol: &str, case: &Case) -> Result<(), StoreError> {
        let mut state = self.state();
        let slot = state
            .cases
            .get_mut(rol)
            .ok_or_else(|| StoreError::NotFound(rol.to_string()))?;
        *slot = case.clone();
        state.writes.replaces += 1;
        debug!(rol, "replaced case");
        Ok(())
    }

    async fn pull_document(&self, rol: &str, identity: &str) -> Result<usize, StoreError> {
        let mut state = self.state();
        let case = state
            .cases
            .get_mut(rol)
            .ok_or_else(|| StoreError::NotFound(rol.to_string()))?;
        let removed = case.pull_document(identity);
        if removed > 0 {
            state.writes.pulls += 1;
        }
        Ok(removed)
    }

    async fn watermark(&self) -> Result<Option<SyncWatermark>, StoreError> {
        let state = self.state();
        Ok(state
            .cases
            .values()
            .max_by(|a, b| a.admission.cmp(&b.admission).then_with(|| a.rol.cmp(&b.rol)))
            .map(SyncWatermark::of))
    }
}
