use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use recall_core::{
    signature, Array, CachedValue, CallArgs, KeyCodec, Kwargs, ObjectMeta, RecallError, Storage,
};
use recall_interpolate::Interpolator;
use recall_store::InMemoryStorage;
use serde_json::Value;

/// Configuration for [`InterpolatedFunction`].
#[derive(Debug, Clone)]
pub struct InterpolationConfig {
    /// Calls at most this far (Euclidean) from a stored support point are
    /// interpolated instead of computed.
    pub max_distance: f64,
    /// Keyword arguments that do not take part in caching.
    pub ignore_kwargs: BTreeSet<String>,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            max_distance: 1.0,
            ignore_kwargs: BTreeSet::new(),
        }
    }
}

impl InterpolationConfig {
    pub fn new(max_distance: f64) -> Self {
        Self {
            max_distance,
            ..Self::default()
        }
    }

    pub fn with_ignore_kwargs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_kwargs.extend(names.into_iter().map(Into::into));
        self
    }
}

/// Interpolator for one kwargs signature, plus the object metadata of the
/// last entry it was built from.
#[derive(Clone)]
struct CachedInterpolator {
    interpolator: Arc<Interpolator>,
    object: Option<ObjectMeta>,
}

/// A function wrapper that interpolates between stored results.
///
/// The positional arguments of a call, flattened to numbers, form its
/// support point. Calls sharing their (filtered) keyword arguments share an
/// interpolation subspace. If the closest stored support point is within
/// `max_distance`, the result is interpolated; otherwise the function runs,
/// its result is stored and the interpolator of that subspace is dropped.
///
/// A hit is decided by distance alone, so a query within `max_distance` of
/// the support but outside its range (one dimension) or convex hull (more
/// dimensions) is answered with NaN rather than by running the function.
///
/// Interpolated results of structured objects are rebuilt with
/// [`Reconstruct::reconstruct_from_interpolated`](recall_core::Reconstruct::reconstruct_from_interpolated)
/// using the metadata of the last stored entry of the subspace.
pub struct InterpolatedFunction<F> {
    func: F,
    storage: Arc<dyn Storage>,
    config: InterpolationConfig,
    codec: KeyCodec,
    interpolators: Mutex<HashMap<String, CachedInterpolator>>,
}

impl<F> InterpolatedFunction<F>
where
    F: Fn(&[Value], &Kwargs) -> Result<CachedValue, RecallError>,
{
    pub fn new(func: F, storage: Arc<dyn Storage>, config: InterpolationConfig) -> Self {
        let codec = KeyCodec::new().ignore(config.ignore_kwargs.iter().cloned());
        Self {
            func,
            storage,
            config,
            codec,
            interpolators: Mutex::new(HashMap::new()),
        }
    }

    /// Wrap `func` with a fresh [`InMemoryStorage`].
    pub fn in_memory(func: F, max_distance: f64) -> Self {
        Self::new(
            func,
            Arc::new(InMemoryStorage::new()),
            InterpolationConfig::new(max_distance),
        )
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn config(&self) -> &InterpolationConfig {
        &self.config
    }

    pub fn call(&self, args: &[Value], kwargs: &Kwargs) -> Result<CachedValue, RecallError> {
        let filtered = self.codec.filter(kwargs);
        let signature = signature(&filtered)?;
        let point = support_point(args)?;

        let cached = self.cached_interpolator(&signature, &filtered)?;
        let distance = cached.interpolator.distance(&point)?;
        if distance <= self.config.max_distance {
            tracing::debug!(distance, signature = %signature, "interpolating result");
            let data = cached.interpolator.evaluate_point(&point)?;
            return self
                .storage
                .registry()
                .reconstruct_from_interpolated(data, args, cached.object.as_ref());
        }

        tracing::debug!(distance, signature = %signature, "no support point close enough, computing");
        let value = (self.func)(args, kwargs)?;
        self.storage.store(&value, args, &filtered)?;
        self.interpolators.lock().remove(&signature);
        Ok(value)
    }

    pub fn call_with(&self, call: &CallArgs) -> Result<CachedValue, RecallError> {
        self.call(call.args(), call.kwargs())
    }

    /// The interpolator for calls with these keyword arguments, built from
    /// storage if it is not cached.
    pub fn interpolator(&self, kwargs: &Kwargs) -> Result<Arc<Interpolator>, RecallError> {
        let filtered = self.codec.filter(kwargs);
        let signature = signature(&filtered)?;
        Ok(self.cached_interpolator(&signature, &filtered)?.interpolator)
    }

    /// Drop the cached interpolator of one subspace, e.g. after its entries
    /// were cleared from storage directly.
    pub fn invalidate(&self, kwargs: &Kwargs) -> Result<(), RecallError> {
        let signature = signature(&self.codec.filter(kwargs))?;
        self.interpolators.lock().remove(&signature);
        Ok(())
    }

    pub fn invalidate_all(&self) {
        self.interpolators.lock().clear();
    }

    /// Number of subspaces with a cached interpolator.
    pub fn cached_interpolators(&self) -> usize {
        self.interpolators.lock().len()
    }

    fn cached_interpolator(
        &self,
        signature: &str,
        filtered: &Kwargs,
    ) -> Result<CachedInterpolator, RecallError> {
        let mut interpolators = self.interpolators.lock();
        if let Some(cached) = interpolators.get(signature) {
            return Ok(cached.clone());
        }

        tracing::debug!(signature = %signature, "building interpolator");
        let mut points = Vec::new();
        let mut values = Vec::new();
        let mut object = None;
        for entry in self.storage.iterate_matching(filtered)? {
            points.push(support_point(&entry.args)?);
            values.push(entry.data);
            object = entry.internal_data.object;
        }
        tracing::debug!(count = points.len(), "found support points");

        let cached = CachedInterpolator {
            interpolator: Arc::new(Interpolator::from_support(points, values)?),
            object,
        };
        interpolators.insert(signature.to_string(), cached.clone());
        Ok(cached)
    }
}

/// Flatten positional arguments into one coordinate vector.
fn support_point(args: &[Value]) -> Result<Vec<f64>, RecallError> {
    let mut point = Vec::new();
    for (i, arg) in args.iter().enumerate() {
        let array = Array::from_json(arg).map_err(|e| {
            RecallError::Interpolation(format!("positional argument {i} is not numeric: {e}"))
        })?;
        point.extend(array.into_vec());
    }
    Ok(point)
}
