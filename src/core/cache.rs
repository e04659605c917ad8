use crate::core::features::FeatureVector;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Feature vectors keyed by asset location.
///
/// Every access goes through one lock, so readers never see a half-written
/// entry. Concurrent misses on the same key are not coalesced: both callers
/// compute and the last `set` wins.
#[derive(Default)]
pub struct FeatureCache {
    entries: Mutex<HashMap<PathBuf, FeatureVector>>,
}

impl FeatureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, location: &Path) -> Option<FeatureVector> {
        self.lock().get(location).cloned()
    }

    pub fn set(&self, location: &Path, vector: FeatureVector) {
        self.lock().insert(location.to_path_buf(), vector);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, FeatureVector>> {
        // A panic while holding the lock cannot leave a partial vector behind,
        // since entries are inserted whole.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
