use std::sync::Arc;

use recall_core::{CallArgs, CachedValue, KeyCodec, Kwargs, RecallError, Storage};
use recall_store::InMemoryStorage;
use serde_json::Value;

/// A function wrapper that stores every result and serves repeated calls
/// from storage.
///
/// The key of a call is derived from its positional arguments and its
/// keyword arguments minus the ignored ones. Each distinct key is computed
/// at most once; errors of the wrapped function are returned as-is and
/// never stored.
///
/// # Example
///
/// ```rust
/// use recall_cache::{CachedFunction, CachedValue};
/// use serde_json::json;
///
/// let square = CachedFunction::in_memory(|args, _kwargs| {
///     let x = args[0].as_f64().unwrap_or(f64::NAN);
///     Ok(CachedValue::from(x * x))
/// });
/// let first = square.call(&[json!(3)], &Default::default()).unwrap();
/// let again = square.call(&[json!(3)], &Default::default()).unwrap();
/// assert_eq!(first.as_scalar(), again.as_scalar());
/// assert_eq!(square.storage().len(), 1);
/// ```
pub struct CachedFunction<F> {
    func: F,
    storage: Arc<dyn Storage>,
    codec: KeyCodec,
}

impl<F> CachedFunction<F>
where
    F: Fn(&[Value], &Kwargs) -> Result<CachedValue, RecallError>,
{
    pub fn new(func: F, storage: Arc<dyn Storage>) -> Self {
        Self {
            func,
            storage,
            codec: KeyCodec::new(),
        }
    }

    /// Wrap `func` with a fresh [`InMemoryStorage`].
    pub fn in_memory(func: F) -> Self {
        Self::new(func, Arc::new(InMemoryStorage::new()))
    }

    /// Keyword arguments that do not take part in caching.
    pub fn with_ignore_kwargs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.codec = self.codec.ignore(names);
        self
    }

    pub fn with_codec(mut self, codec: KeyCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Return the stored result for this call, computing and storing it on a
    /// miss.
    pub fn call(&self, args: &[Value], kwargs: &Kwargs) -> Result<CachedValue, RecallError> {
        let filtered = self.codec.filter(kwargs);
        match self.storage.retrieve(args, &filtered) {
            Ok(hit) => {
                tracing::debug!("cache hit");
                Ok(hit.value)
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!("cache miss, computing");
                let value = (self.func)(args, kwargs)?;
                self.storage.store(&value, args, &filtered)?;
                Ok(value)
            }
            Err(e) => Err(e),
        }
    }

    pub fn call_with(&self, call: &CallArgs) -> Result<CachedValue, RecallError> {
        self.call(call.args(), call.kwargs())
    }

    /// Clear stored results; see [`Storage::clear`].
    pub fn clear(&self, time_max: Option<f64>, kwargs: Option<&Kwargs>) -> Result<usize, RecallError> {
        let filtered = kwargs.map(|k| self.codec.filter(k));
        self.storage.clear(time_max, filtered.as_ref())
    }
}
