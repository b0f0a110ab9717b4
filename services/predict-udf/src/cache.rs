//! In-memory model cache keyed by model name.
//!
//! Entries go from absent to present and are never evicted. Population is
//! not single-flight: concurrent misses for the same name may each resolve,
//! and the last insert wins. Records are immutable so either copy is valid.

use crate::resolver::ModelRecord;
use parking_lot::RwLock;
use predict_core::PREDICT_METRICS;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
pub struct ModelCache {
    entries: RwLock<HashMap<String, Arc<ModelRecord>>>,
}

impl ModelCache {
    pub fn new() -> Self { Self::default() }

    pub fn get(&self, model: &str) -> Option<Arc<ModelRecord>> { self.entries.read().get(model).cloned() }

    pub fn insert(&self, model: &str, record: ModelRecord) -> Arc<ModelRecord> {
        let record = Arc::new(record);
        if self.entries.write().insert(model.to_string(), record.clone()).is_some() {
            debug!(model, "replaced concurrently resolved model");
        }
        record
    }

    pub fn contains(&self, model: &str) -> bool { self.entries.read().contains_key(model) }
    pub fn len(&self) -> usize { self.entries.read().len() }
    pub fn is_empty(&self) -> bool { self.entries.read().is_empty() }

    /// Cached model names, sorted.
    pub fn models(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Return the cached record or build it with `resolve`. No lock is held
    /// while `resolve` runs.
    pub fn get_or_try_insert_with<E, F>(&self, model: &str, resolve: F) -> Result<Arc<ModelRecord>, E>
    where
        F: FnOnce() -> Result<ModelRecord, E>,
    {
        if let Some(record) = self.get(model) {
            PREDICT_METRICS.cache_lookups_total.with_label_values(&["hit"]).inc();
            return Ok(record);
        }
        PREDICT_METRICS.cache_lookups_total.with_label_values(&["miss"]).inc();
        debug!(model, "model not cached");
        let record = resolve()?;
        Ok(self.insert(model, record))
    }
}
