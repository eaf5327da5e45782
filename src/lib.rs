// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # depslice
//!
//! Bounded, cycle-safe extraction of one entity at one simulation cycle from
//! nested simulation record trees, emitted as JSON.
//!
//! ## Architecture
//!
//! - **Values** (`value`, `classify`): shared record trees with back-references,
//!   numeric arrays over `ndarray`, and a total five-way classification
//! - **Serialization** (`serialize`, `marker`): depth-limited, cycle-safe JSON
//!   conversion that summarizes large arrays and embeds failures as typed markers
//! - **Navigation** (`navigate`): field-by-field descent with explicit not-found errors
//! - **Coordinates** (`coordinate`): bounds-checked entity/cycle indexing
//! - **Orchestration** (`extractor`, `export`): fixed-path descent plus per-field
//!   extraction into a result document
//! - **Sources** (`source`, `config`): JSON record documents and TOML configuration
//!
//! ## Library usage
//!
//! ```no_run
//! use std::path::Path;
//!
//! use depslice::config::ExtractorConfig;
//! use depslice::export::ExtractionRequest;
//! use depslice::extractor::Extractor;
//!
//! let extractor = Extractor::open(Path::new("subset.json"), ExtractorConfig::default()).unwrap();
//! let result = extractor.extract(ExtractionRequest::new(1, 50));
//! println!("{}", serde_json::to_string_pretty(&result).unwrap());
//! ```

pub mod classify;
pub mod config;
pub mod coordinate;
pub mod error;
pub mod export;
pub mod extractor;
pub mod marker;
pub mod navigate;
pub mod serialize;
pub mod source;
pub mod value;
