//! Timer-driven stages: ingestion, export, and manual replay

pub mod export;
pub mod ingestion;
pub mod replay;

pub use export::{ExportReport, ExportStage};
pub use ingestion::{IngestionReport, IngestionSettings, IngestionStage};
pub use replay::{replay, ReplayReport};
