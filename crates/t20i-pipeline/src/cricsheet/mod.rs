//! Cricsheet match documents
//!
//! [`models`] mirrors the JSON document layout; [`parser`] flattens one
//! document into the two output schemas.

pub mod models;
pub mod parser;

pub use models::RawMatchRecord;
pub use parser::{parse_document, parse_match, ParsedMatch};
