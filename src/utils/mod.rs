//! In-memory ledger and validation helpers

pub mod memory_storage;
pub mod validation;

pub use memory_storage::MemoryStorage;
pub use validation::*;
