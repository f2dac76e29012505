//! # SIE Core
//!
//! Reading, writing and importing SIE type 4 files, the Swedish standard for
//! moving bookkeeping data between accounting programs.
//!
//! ## Features
//!
//! - **Byte decoding**: CP850 (`#FORMAT PC8`) detection and decoding, with UTF-8 and Latin-1 fallbacks
//! - **Parsing**: tolerant line-oriented parser that collects warnings instead of failing on bad lines
//! - **Import**: date range, category and exclusion settings, missing-account handling and duplicate detection
//! - **Export**: SIE 4 generation from a ledger, encoded as CP850
//! - **Storage abstraction**: database-agnostic design with trait-based storage
//!
//! ## Quick Start
//!
//! ```rust
//! use sie_core::{parse, ImportSettings, SieImporter, MemoryStorage};
//!
//! # async fn run() -> sie_core::SieResult<()> {
//! let text = "#FLAGGA 0\n#KONTO 1930 Bank\n#KONTO 3001 Försäljning\n\
//!             #VER A 1 20240115 Kassa\n{\n#TRANS 1930 {} 100\n#TRANS 3001 {} -100\n}\n";
//! let parsed = parse(text)?;
//!
//! let mut importer = SieImporter::new(MemoryStorage::new());
//! let resultat = importer.import(&parsed.data, &ImportSettings::default()).await?;
//! assert_eq!(resultat.importerade_verifikationer, 1);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod encoding;
pub mod export;
pub mod import;
pub mod sie;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::{init_tracing, ExportConfig, LoggingConfig, SieConfig, UploadConfig};
pub use export::export_ledger;
pub use import::*;
pub use sie::{parse, parse_bytes, validate, ParseOutcome, SieGenerator, ValidationIssue};
pub use traits::*;
pub use types::*;
pub use utils::MemoryStorage;
