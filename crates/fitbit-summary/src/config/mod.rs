//! Environment-driven configuration
//!
//! Values come from the process environment, after an optional `.env` file has
//! been loaded by the binary. Nothing here is global: the resulting
//! [`IngestConfig`] is handed to the components that need it.

use std::path::{Path, PathBuf};

use crate::error::{Result, SummaryError};

/// Default configuration directory name
const DATA_DIR_NAME: &str = "fitbit-summary";

/// Bucket holding the raw Fitbit exports
pub const DEFAULT_BUCKET: &str = "fitbit";

/// Table receiving the aggregated rows
pub const DEFAULT_TABLE: &str = "data_summary";

/// Maximum number of objects listed per run
pub const DEFAULT_LIST_LIMIT: usize = 10_000;

const URL_VARS: [&str; 1] = ["SUPABASE_URL"];
const KEY_VARS: [&str; 2] = ["SUPABASE_SERVICE_KEY", "SUPABASE_ANON_KEY"];
const BUCKET_VARS: [&str; 1] = ["FITBIT_BUCKET"];
const TABLE_VARS: [&str; 1] = ["FITBIT_SUMMARY_TABLE"];
const LIMIT_VARS: [&str; 1] = ["FITBIT_LIST_LIMIT"];

/// Endpoint and key for the hosted storage and table API
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub key: String,
}

/// Settings for one ingestion or query run
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
    pub bucket: String,
    pub table: String,
    /// Raw `FITBIT_LIST_LIMIT`, validated by [`IngestConfig::list_limit`]
    pub list_limit: Option<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            supabase_url: None,
            supabase_key: None,
            bucket: DEFAULT_BUCKET.to_string(),
            table: DEFAULT_TABLE.to_string(),
            list_limit: None,
        }
    }
}

impl IngestConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let read = |candidates: &[&str]| {
            candidates
                .iter()
                .find_map(|key| lookup(key).filter(|v| !v.trim().is_empty()))
        };

        Ok(Self {
            supabase_url: read(&URL_VARS).map(|u| u.trim_end_matches('/').to_string()),
            supabase_key: read(&KEY_VARS),
            bucket: read(&BUCKET_VARS).unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            table: read(&TABLE_VARS).unwrap_or_else(|| DEFAULT_TABLE.to_string()),
            list_limit: read(&LIMIT_VARS),
        })
    }

    /// Listing cap for ingestion runs
    ///
    /// Only ingestion reads this, so a malformed value does not get in the way
    /// of the read commands.
    pub fn list_limit(&self) -> Result<usize> {
        let Some(raw) = self.list_limit.as_deref() else {
            return Ok(DEFAULT_LIST_LIMIT);
        };
        match raw.trim().parse::<usize>() {
            Ok(limit) if limit > 0 => Ok(limit),
            _ => Err(SummaryError::config(format!(
                "FITBIT_LIST_LIMIT must be a positive integer, got '{}'",
                raw
            ))),
        }
    }

    /// Remote endpoint settings; an error if either value is missing
    pub fn supabase(&self) -> Result<SupabaseConfig> {
        let url = self
            .supabase_url
            .clone()
            .ok_or_else(|| SummaryError::config("SUPABASE_URL is not set"))?;
        let key = self.supabase_key.clone().ok_or_else(|| {
            SummaryError::config("Neither SUPABASE_SERVICE_KEY nor SUPABASE_ANON_KEY is set")
        })?;
        Ok(SupabaseConfig { url, key })
    }
}

/// Get the data directory path for local databases
/// Returns ~/.local/share/fitbit-summary on Unix, ~/Library/Application Support/fitbit-summary on macOS
pub fn data_dir() -> Result<PathBuf> {
    dirs::data_local_dir()
        .map(|p| p.join(DATA_DIR_NAME))
        .ok_or_else(|| SummaryError::config("Could not determine data directory"))
}

/// Default location of the local summary database
pub fn default_db_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("summary.db"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
