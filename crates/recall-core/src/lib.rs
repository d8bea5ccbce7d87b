mod array;
pub mod key;
mod object;

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use array::Array;
pub use key::{kwargs, make_key, signature, CacheKey, CallArgs, KeyCodec, KeyFn, Kwargs};
pub use object::{AsAny, CachedValue, ObjectMeta, ObjectRegistry, Reconstruct, StorableObject};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Unified error type for Recall with variants covering all subsystems.
#[derive(Debug, Error)]
pub enum RecallError {
    /// No live entry matches the derived key. Decorators treat this as a miss.
    #[error("not found: {0}")]
    NotFound(String),
    #[error("read-only storage: {0}")]
    ReadOnly(String),
    /// An entry exists under the key but was stored for different arguments.
    #[error("hash collision: key {key} is held by different arguments")]
    HashCollision { key: String },
    #[error("deserialization error: {0}")]
    Deserialization(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("interpolation error: {0}")]
    Interpolation(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("storage error: {0}")]
    Storage(String),
    /// Raised by a wrapped function; never cached.
    #[error("function error: {0}")]
    Function(String),
}

impl RecallError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// Bookkeeping stored with every entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalData {
    /// Seconds since the Unix epoch.
    pub time_stored: f64,
    #[serde(flatten, default)]
    pub object: Option<ObjectMeta>,
}

impl InternalData {
    pub fn now(object: Option<ObjectMeta>) -> Self {
        Self {
            time_stored: now_timestamp(),
            object,
        }
    }
}

/// Current time as fractional seconds since the Unix epoch.
pub fn now_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// One stored record.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub key: CacheKey,
    pub data: Array,
    pub args: Vec<Value>,
    pub kwargs: Kwargs,
    pub internal_data: InternalData,
}

impl Entry {
    /// Whether this entry was stored for exactly these arguments.
    pub fn matches(&self, args: &[Value], kwargs: &Kwargs) -> bool {
        self.args == args && &self.kwargs == kwargs
    }
}

/// An entry together with the physical record name it lives under. Names are
/// unique within a backend; keys are unique unless they collide.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub name: String,
    pub entry: Entry,
}

/// Result of [`Storage::retrieve`].
#[derive(Debug)]
pub struct Retrieved {
    pub value: CachedValue,
    pub args: Vec<Value>,
    pub kwargs: Kwargs,
    pub internal_data: InternalData,
}

/// Entries whose stored kwargs equal a query, taken from a snapshot of the
/// backend. Call [`Storage::iterate_matching`] again to restart.
pub struct MatchingEntries {
    inner: std::vec::IntoIter<StoredEntry>,
    kwargs: Kwargs,
}

impl MatchingEntries {
    pub fn new(snapshot: Vec<StoredEntry>, kwargs: Kwargs) -> Self {
        Self {
            inner: snapshot.into_iter(),
            kwargs,
        }
    }
}

impl Iterator for MatchingEntries {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        let kwargs = &self.kwargs;
        self.inner
            .by_ref()
            .find(|stored| &stored.entry.kwargs == kwargs)
            .map(|stored| stored.entry)
    }
}

// ---------------------------------------------------------------------------
// Storage trait (implemented in recall-store and recall-sqlite)
// ---------------------------------------------------------------------------

/// A backend mapping call arguments to stored results.
///
/// Implementors provide the record-level primitives; the argument-level
/// operations (`store`, `retrieve`, `iterate_matching`, `delete`, `clear`)
/// are built on top of them and enforce read-only mode before any side
/// effect.
pub trait Storage: Send + Sync {
    /// Registry used to rebuild structured results.
    fn registry(&self) -> &ObjectRegistry;

    /// Number of live entries.
    fn len(&self) -> usize;

    /// Live records indexed under `key`.
    fn records(&self, key: &CacheKey) -> Result<Vec<StoredEntry>, RecallError>;

    /// Snapshot of all live records.
    fn entries(&self) -> Result<Vec<StoredEntry>, RecallError>;

    /// Write a record and index it, returning its physical name.
    fn insert(&self, entry: Entry) -> Result<String, RecallError>;

    /// Drop a record from the index (file backends tombstone it).
    fn remove(&self, name: &str) -> Result<(), RecallError>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_readonly(&self) -> bool {
        false
    }

    /// Key derivation used by this backend.
    fn key_for(&self, args: &[Value], kwargs: &Kwargs) -> Result<CacheKey, RecallError> {
        make_key(args, kwargs)
    }

    fn check_writable(&self, operation: &str) -> Result<(), RecallError> {
        if self.is_readonly() {
            return Err(RecallError::ReadOnly(format!(
                "cannot {operation} on a read-only storage"
            )));
        }
        Ok(())
    }

    /// Store `value` for the call `(args, kwargs)`. A previous entry for the
    /// same arguments is replaced.
    fn store(&self, value: &CachedValue, args: &[Value], kwargs: &Kwargs) -> Result<(), RecallError> {
        self.check_writable("store")?;
        let key = self.key_for(args, kwargs)?;
        let (data, object) = value.prepare_for_storage()?;
        for existing in self.records(&key)? {
            if existing.entry.matches(args, kwargs) {
                self.remove(&existing.name)?;
            }
        }
        let name = self.insert(Entry {
            key: key.clone(),
            data,
            args: args.to_vec(),
            kwargs: kwargs.clone(),
            internal_data: InternalData::now(object),
        })?;
        tracing::debug!(key = %key, name = %name, "stored entry");
        Ok(())
    }

    /// The live record stored for exactly `(args, kwargs)`.
    fn lookup(&self, args: &[Value], kwargs: &Kwargs) -> Result<StoredEntry, RecallError> {
        let key = self.key_for(args, kwargs)?;
        let candidates = self.records(&key)?;
        if candidates.is_empty() {
            return Err(RecallError::NotFound(format!("no entry for key {key}")));
        }
        candidates
            .into_iter()
            .find(|stored| stored.entry.matches(args, kwargs))
            .ok_or_else(|| RecallError::HashCollision {
                key: key.to_string(),
            })
    }

    /// Load and rebuild the result stored for `(args, kwargs)`.
    fn retrieve(&self, args: &[Value], kwargs: &Kwargs) -> Result<Retrieved, RecallError> {
        let stored = self.lookup(args, kwargs)?;
        tracing::debug!(name = %stored.name, "retrieved entry");
        let Entry {
            data,
            args,
            kwargs,
            internal_data,
            ..
        } = stored.entry;
        let value = self
            .registry()
            .reconstruct(data, internal_data.object.as_ref())?;
        Ok(Retrieved {
            value,
            args,
            kwargs,
            internal_data,
        })
    }

    /// Entries stored under exactly these (filtered) kwargs.
    fn iterate_matching(&self, kwargs: &Kwargs) -> Result<MatchingEntries, RecallError> {
        Ok(MatchingEntries::new(self.entries()?, kwargs.clone()))
    }

    /// Delete every record indexed under `key`.
    fn delete(&self, key: &CacheKey) -> Result<(), RecallError> {
        self.check_writable("delete")?;
        let records = self.records(key)?;
        if records.is_empty() {
            return Err(RecallError::NotFound(format!("no entry for key {key}")));
        }
        for stored in records {
            self.remove(&stored.name)?;
        }
        Ok(())
    }

    /// Delete entries stored before `time_max` (all, if unset) whose kwargs
    /// equal `kwargs` (all, if unset). Returns the number of deleted entries.
    fn clear(&self, time_max: Option<f64>, kwargs: Option<&Kwargs>) -> Result<usize, RecallError> {
        self.check_writable("clear")?;
        let mut removed = 0;
        for stored in self.entries()? {
            let old_enough = time_max.map_or(true, |t| stored.entry.internal_data.time_stored < t);
            let kwargs_match = kwargs.map_or(true, |k| &stored.entry.kwargs == k);
            if old_enough && kwargs_match {
                self.remove(&stored.name)?;
                removed += 1;
            }
        }
        tracing::debug!(removed, "cleared entries");
        Ok(removed)
    }
}

/// Pick a physical record name for `key` that `taken` does not report as
/// used: the key itself, then `<key>_000`, `<key>_001`, ...
pub fn unique_name(
    key: &CacheKey,
    mut taken: impl FnMut(&str) -> Result<bool, RecallError>,
) -> Result<String, RecallError> {
    let base = key.as_str();
    let mut name = base.to_string();
    let mut suffix = 0u32;
    while taken(&name)? {
        name = format!("{base}_{suffix:03}");
        suffix += 1;
    }
    if suffix > 0 {
        tracing::warn!(key = %key, name = %name, "key collision, record stored under suffixed name");
    }
    Ok(name)
}
