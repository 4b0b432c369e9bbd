//! Summary table persistence
//!
//! Rows are keyed by `(usage_id, date)` and written with replace-on-conflict
//! semantics, so re-running an ingestion overwrites rather than duplicates.
//!
//! ## Backends
//!
//! - **PostgREST**: the hosted `data_summary` table ([`RestSummaryStore`])
//! - **SQLite**: a local file with the same schema ([`SqliteSummaryStore`])
//!
//! ## Local Layout
//!
//! ```text
//! ~/.local/share/fitbit-summary/
//! └── summary.db                   # SQLite data_summary table
//! ```

mod rest;
mod sqlite;

pub use rest::RestSummaryStore;
pub use sqlite::SqliteSummaryStore;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{AggregateRow, SummaryQuery};

/// Rows written per request or transaction
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Destination and read model of the daily summary table
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Human-readable location, for log output
    fn describe(&self) -> String;

    /// Insert or fully replace every row, returning how many were written
    ///
    /// An empty slice performs no storage operation.
    async fn upsert_all(&self, rows: &[AggregateRow]) -> Result<usize>;

    /// Distinct usage ids present in the table, sorted
    async fn usage_ids(&self) -> Result<Vec<String>>;

    /// Rows for one usage id within an inclusive date range, oldest first
    async fn fetch_rows(&self, query: &SummaryQuery) -> Result<Vec<AggregateRow>>;
}

pub type SharedSummaryStore = Arc<dyn SummaryStore>;
