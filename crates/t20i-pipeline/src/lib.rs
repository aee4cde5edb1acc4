//! Men's T20I Cricket Dataset Pipeline
//!
//! Keeps two cumulative CSV datasets (one row per delivery, one row per
//! match) current as Cricsheet publishes new matches, and republishes both
//! as a new dataset version.
//!
//! # Stages
//!
//! - **Ingestion**: downloads the source archive, detects unseen match files,
//!   stores them as raw inputs and announces each on the message bus
//! - **Delivery-wise / Match-wise aggregation**: parse announced inputs and
//!   merge their rows into the datasets, recording completion per input
//! - **Export**: stages both datasets and publishes a new version
//!
//! Each stage runs through [`runtime::invoke`], which turns the outcome into
//! a `{statusCode, body}` response and sends a status alert.
//!
//! # Example
//!
//! ```no_run
//! use t20i_pipeline::config::PipelineConfig;
//! use t20i_pipeline::runtime::{self, Services};
//!
//! #[tokio::main]
//! async fn main() -> t20i_common::Result<()> {
//!     let services = Services::connect(PipelineConfig::from_env()?).await?;
//!     println!("{}", runtime::ingest(&services).await?);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod aggregate;
pub mod alerts;
pub mod archive;
pub mod bus;
pub mod cli;
pub mod config;
pub mod cricsheet;
pub mod dataset;
pub mod db;
pub mod detector;
pub mod host;
pub mod runtime;
pub mod stages;
pub mod status;
pub mod storage;

#[cfg(test)]
mod test_support;
