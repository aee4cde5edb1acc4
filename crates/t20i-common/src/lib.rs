//! T20I Common Library
//!
//! Shared types, logging, and error handling for the T20I dataset pipeline.
//!
//! # Overview
//!
//! - **Error Handling**: the pipeline error taxonomy and its retry classification
//! - **Logging**: `tracing` subscriber setup shared by every stage binary
//! - **Records**: the delivery-wise and match-wise row schemas and processing status
//!
//! # Example
//!
//! ```no_run
//! use t20i_common::{PipelineError, Result};
//! use t20i_common::records::match_id_from_key;
//!
//! fn match_id(key: &str) -> Result<u64> {
//!     match_id_from_key(key).ok_or_else(|| PipelineError::malformed(key, "non-numeric file stem"))
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;
pub mod records;

// Re-export commonly used types
pub use error::{PipelineError, Result};
pub use records::{
    DatasetRecord, DeliveryKey, DeliveryRecord, MatchId, MatchSummaryRecord, ProcessingStatus,
    StatusField,
};
