//! Ingestion of raw Fitbit exports into daily summary rows
//!
//! Provides:
//! - Object path parsing against the export bucket layout
//! - Filename date extraction
//! - Grouping by usage id and date
//! - Per-category metric extraction over typed JSON paths
//! - A batch pipeline with a bounded worker pool

pub mod date;
pub mod extract;
pub mod group;
pub mod json_path;
pub mod path;
pub mod pipeline;
pub mod progress;

pub use date::extract_date;
pub use extract::{assemble_row, extract_group, ExtractionError};
pub use group::{group, Grouped};
pub use json_path::{JsonPath, PathError, Step};
pub use path::{ParseOutcome, PathParser, SkipReason};
pub use pipeline::{GroupFailure, IngestOptions, Pipeline, RunReport, DEFAULT_CONCURRENCY};
pub use progress::{IngestProgress, SharedProgress};
