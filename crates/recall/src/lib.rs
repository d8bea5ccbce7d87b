//! Recall: memoize expensive function calls in memory or on disk.
//!
//! This crate re-exports all Recall sub-crates for convenient single-import usage.
//! Enable features to control which modules are available.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `default` | `store`, `interpolate`, `cache` |
//! | `store` | `InMemoryStorage` |
//! | `sqlite` | `SqliteStorage`, a single-file persistent backend |
//! | `interpolate` | `Interpolator` over scattered support points |
//! | `cache` | `CachedFunction` and `InterpolatedFunction` wrappers |
//! | `full` | All features enabled |
//!
//! # Quick Start
//!
//! ```rust
//! use recall::cache::{CachedFunction, CachedValue};
//! use recall::core::Kwargs;
//! use serde_json::json;
//!
//! let cube = CachedFunction::in_memory(|args, _| {
//!     let x = args[0].as_f64().unwrap_or(f64::NAN);
//!     Ok(CachedValue::from(x * x * x))
//! });
//! assert_eq!(cube.call(&[json!(2)], &Kwargs::new()).unwrap().as_scalar(), Some(8.0));
//! ```

/// Core types: Array, CachedValue, Storage, RecallError, key derivation and
/// the object registry. Always available.
pub use recall_core as core;

/// In-memory storage backend.
#[cfg(feature = "store")]
pub use recall_store as store;

/// SQLite-file storage backend with tombstones and repacking.
#[cfg(feature = "sqlite")]
pub use recall_sqlite as sqlite;

/// Piecewise-linear interpolation: linear in 1-D, Delaunay simplices above.
#[cfg(feature = "interpolate")]
pub use recall_interpolate as interpolate;

/// Function wrappers: CachedFunction, InterpolatedFunction.
#[cfg(feature = "cache")]
pub use recall_cache as cache;

/// The most common imports in one place.
pub mod prelude {
    pub use recall_core::{
        kwargs, Array, CachedValue, CallArgs, Kwargs, RecallError, Reconstruct, StorableObject,
        Storage,
    };

    #[cfg(feature = "cache")]
    pub use recall_cache::{CachedFunction, InterpolatedFunction, InterpolationConfig};
    #[cfg(feature = "interpolate")]
    pub use recall_interpolate::Interpolator;
    #[cfg(feature = "sqlite")]
    pub use recall_sqlite::{SqliteStorage, SqliteStorageConfig};
    #[cfg(feature = "store")]
    pub use recall_store::InMemoryStorage;
}
