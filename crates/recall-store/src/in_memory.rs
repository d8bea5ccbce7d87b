use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use recall_core::{
    make_key, unique_name, CacheKey, Entry, KeyFn, Kwargs, ObjectRegistry, RecallError, Storage,
    StoredEntry,
};
use serde_json::Value;

#[derive(Default)]
struct Inner {
    /// Live records in insertion order.
    records: Vec<StoredEntry>,
    index: HashMap<CacheKey, Vec<String>>,
}

/// Storage that keeps all entries in process memory.
pub struct InMemoryStorage {
    inner: RwLock<Inner>,
    registry: Arc<ObjectRegistry>,
    key_fn: KeyFn,
}

impl InMemoryStorage {
    /// Create an empty storage with its own object registry.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(ObjectRegistry::new()))
    }

    /// Create an empty storage sharing an existing object registry.
    pub fn with_registry(registry: Arc<ObjectRegistry>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            registry,
            key_fn: make_key,
        }
    }

    /// Replace the key derivation function.
    pub fn with_key_fn(mut self, key_fn: KeyFn) -> Self {
        self.key_fn = key_fn;
        self
    }

    pub fn registry_handle(&self) -> Arc<ObjectRegistry> {
        Arc::clone(&self.registry)
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for InMemoryStorage {
    fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    fn key_for(&self, args: &[Value], kwargs: &Kwargs) -> Result<CacheKey, RecallError> {
        (self.key_fn)(args, kwargs)
    }

    fn records(&self, key: &CacheKey) -> Result<Vec<StoredEntry>, RecallError> {
        let inner = self.inner.read();
        let Some(names) = inner.index.get(key) else {
            return Ok(Vec::new());
        };
        Ok(inner
            .records
            .iter()
            .filter(|stored| names.contains(&stored.name))
            .cloned()
            .collect())
    }

    fn entries(&self) -> Result<Vec<StoredEntry>, RecallError> {
        Ok(self.inner.read().records.clone())
    }

    fn insert(&self, entry: Entry) -> Result<String, RecallError> {
        let mut inner = self.inner.write();
        let name = unique_name(&entry.key, |candidate| {
            Ok(inner.records.iter().any(|stored| stored.name == candidate))
        })?;
        inner
            .index
            .entry(entry.key.clone())
            .or_default()
            .push(name.clone());
        inner.records.push(StoredEntry {
            name: name.clone(),
            entry,
        });
        Ok(name)
    }

    fn remove(&self, name: &str) -> Result<(), RecallError> {
        let mut inner = self.inner.write();
        let position = inner
            .records
            .iter()
            .position(|stored| stored.name == name)
            .ok_or_else(|| RecallError::NotFound(format!("no record named `{name}`")))?;
        let removed = inner.records.remove(position);
        if let Some(names) = inner.index.get_mut(&removed.entry.key) {
            names.retain(|n| n != name);
            if names.is_empty() {
                inner.index.remove(&removed.entry.key);
            }
        }
        tracing::debug!(name = %name, "removed entry from memory");
        Ok(())
    }

    fn clear(&self, time_max: Option<f64>, kwargs: Option<&Kwargs>) -> Result<usize, RecallError> {
        if time_max.is_none() && kwargs.is_none() {
            let mut inner = self.inner.write();
            let removed = inner.records.len();
            inner.records.clear();
            inner.index.clear();
            tracing::debug!(removed, "cleared memory storage");
            return Ok(removed);
        }
        let mut removed = 0;
        for stored in self.entries()? {
            let old_enough = time_max.map_or(true, |t| stored.entry.internal_data.time_stored < t);
            let kwargs_match = kwargs.map_or(true, |k| &stored.entry.kwargs == k);
            if old_enough && kwargs_match {
                self.remove(&stored.name)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
