//! SIE text format: tags, tokenizer, parser, validation and generator

pub mod generator;
pub mod parser;
pub mod tags;
pub mod tokenizer;
pub mod validate;

pub use generator::*;
pub use parser::*;
pub use tags::*;
pub use tokenizer::*;
pub use validate::*;
