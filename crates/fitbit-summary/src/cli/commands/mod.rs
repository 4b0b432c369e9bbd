pub mod ingest;
pub mod summary;

pub use ingest::run as ingest;
pub use summary::{rows as summary, users};

use std::path::PathBuf;
use std::sync::Arc;

use crate::blob::{LocalBlobStore, SharedBlobStore, StorageClient};
use crate::client::SupabaseClient;
use crate::config::{default_db_path, ensure_dir, IngestConfig};
use crate::error::Result;
use crate::storage::{RestSummaryStore, SharedSummaryStore, SqliteSummaryStore};

/// Where summary rows are read from and written to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    /// The hosted table named in the configuration
    Remote,
    /// A local SQLite file, or the default one when no path is given
    Sqlite(Option<PathBuf>),
}

impl StoreTarget {
    /// Interpret the `--sqlite [PATH]` flag
    pub fn from_flag(sqlite: Option<Option<PathBuf>>) -> Self {
        match sqlite {
            Some(path) => StoreTarget::Sqlite(path),
            None => StoreTarget::Remote,
        }
    }
}

fn remote_client(config: &IngestConfig) -> Result<SupabaseClient> {
    SupabaseClient::new(&config.supabase()?)
}

/// Open the raw export source: a local directory, or the hosted bucket
pub fn open_blob_store(config: &IngestConfig, local: Option<PathBuf>) -> Result<SharedBlobStore> {
    match local {
        Some(root) => Ok(Arc::new(LocalBlobStore::new(root, config.bucket.clone()))),
        None => Ok(Arc::new(StorageClient::new(
            remote_client(config)?,
            config.bucket.clone(),
        ))),
    }
}

/// Open the summary table selected on the command line
pub fn open_summary_store(config: &IngestConfig, target: &StoreTarget) -> Result<SharedSummaryStore> {
    match target {
        StoreTarget::Remote => Ok(Arc::new(RestSummaryStore::new(
            remote_client(config)?,
            config.table.clone(),
        ))),
        StoreTarget::Sqlite(path) => {
            let path = match path {
                Some(path) => path.clone(),
                None => default_db_path()?,
            };
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                ensure_dir(parent)?;
            }
            Ok(Arc::new(SqliteSummaryStore::open(&path)?))
        }
    }
}

/// Table name shown in user-facing messages
pub fn table_name(config: &IngestConfig, target: &StoreTarget) -> String {
    match target {
        StoreTarget::Remote => config.table.clone(),
        StoreTarget::Sqlite(_) => crate::config::DEFAULT_TABLE.to_string(),
    }
}
