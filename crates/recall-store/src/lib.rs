//! In-memory storage backend for Recall.
//!
//! [`InMemoryStorage`] keeps every entry in a live map. Nothing is persisted,
//! deletes take effect immediately and `clear` empties the map.

mod in_memory;

pub use in_memory::InMemoryStorage;

// Re-export core types for convenience.
pub use recall_core::{ObjectRegistry, RecallError, Storage};
