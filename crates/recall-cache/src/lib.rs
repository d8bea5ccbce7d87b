//! Cache decorators for pure numeric functions.
//!
//! - [`CachedFunction`] returns stored results for repeated calls and only
//!   runs the wrapped function on a miss.
//! - [`InterpolatedFunction`] additionally answers calls close to already
//!   computed ones by interpolating between stored results.

mod cached;
mod interpolated;

pub use cached::CachedFunction;
pub use interpolated::{InterpolatedFunction, InterpolationConfig};

// Re-export the pieces a wrapped function deals with.
pub use recall_core::{CachedValue, Kwargs, RecallError, Storage};
