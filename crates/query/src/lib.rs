//! # ULP Query
//!
//! The search facade: composes the corpus scanner and the field extractor
//! into deduplicated, unbounded query answers, with a streaming variant
//! whose consumer controls how much corpus I/O actually happens.

mod engine;
mod error;
mod mode;

pub use engine::{SearchEngine, SearchReply};
pub use error::{QueryError, Result};
pub use mode::SearchMode;
