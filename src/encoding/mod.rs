//! Character encodings used by SIE files

pub mod cp850;

pub use cp850::*;
