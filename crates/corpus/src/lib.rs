//! # ULP Corpus
//!
//! Flat-file corpus access: streaming line scans over a directory of
//! delimiter-separated record dumps, plus the heuristic extraction of
//! (identifier, secret) pairs from matched lines.

mod error;
pub mod extract;
mod scanner;

pub use error::{CorpusError, Result};
pub use scanner::{CorpusScanner, CorpusStats, LineScan};
