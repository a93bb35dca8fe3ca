//! Process-wide artifact cache.
//!
//! Each location gets one slot. The first caller loads the artifact; callers
//! arriving while that load is in flight wait for it instead of starting
//! their own. A load that fails (or whose caller is dropped) leaves the slot
//! empty, so the next caller tries again.

use crate::artifact::{ArtifactLocation, LoadedIndex};
use kb_core::AppResult;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OnceCell;

type Slot = Arc<OnceCell<Arc<LoadedIndex>>>;

#[derive(Debug, Default)]
pub struct ArtifactCache {
    slots: Mutex<HashMap<String, Slot>>,
}

impl ArtifactCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        // The map holds no invariants a panicking holder could break.
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn slot(&self, key: &str) -> Slot {
        self.slots().entry(key.to_string()).or_default().clone()
    }

    /// Loaded index for `location`, reading it on first use.
    pub async fn get_or_load(&self, location: &ArtifactLocation) -> AppResult<Arc<LoadedIndex>> {
        self.get_or_load_with(&location.cache_key(), move || async move {
            location.load().await.map(Arc::new)
        })
        .await
    }

    /// Loaded index under `key`, produced by `load` on first use.
    pub async fn get_or_load_with<F, Fut>(&self, key: &str, load: F) -> AppResult<Arc<LoadedIndex>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<Arc<LoadedIndex>>>,
    {
        let slot = self.slot(key);
        let index = slot.get_or_try_init(load).await?;
        Ok(Arc::clone(index))
    }

    /// Drop the entry for `key`. Returns whether a loaded index was dropped.
    ///
    /// Retrievers already holding the index keep it; the next lookup loads
    /// afresh.
    pub fn invalidate(&self, key: &str) -> bool {
        self.slots()
            .remove(key)
            .is_some_and(|slot| slot.initialized())
    }

    pub fn clear(&self) {
        self.slots().clear();
    }

    /// Number of fully loaded entries.
    pub fn len(&self) -> usize {
        self.slots().values().filter(|s| s.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
