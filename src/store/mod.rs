//! Persistence layer: whole-file JSON stores for the ledger, history, and
//! seen-item cache.

pub mod json;
pub mod memory;
pub mod traits;

pub use json::JsonFileStore;
pub use memory::MemoryStore;
pub use traits::StateStore;
