//! Import pipeline: settings filter, duplicate detection and the executor

pub mod duplicates;
pub mod executor;
pub mod filter;

pub use duplicates::*;
pub use executor::*;
pub use filter::*;
