//! Batch ingestion: list, parse, group, extract, upsert

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::blob::SharedBlobStore;
use crate::config::DEFAULT_LIST_LIMIT;
use crate::error::{Result, SummaryError};
use crate::ingest::extract::{extract_group, ExtractionError};
use crate::ingest::group::group;
use crate::ingest::path::{ParseOutcome, PathParser, SkipReason, DEFAULT_ROOT};
use crate::ingest::progress::{IngestProgress, SharedProgress};
use crate::models::{AggregateRow, FileGroup, GroupKey};
use crate::storage::SharedSummaryStore;

/// Default number of groups extracted concurrently
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Knobs for one ingestion run
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Listing prefix inside the bucket
    pub prefix: String,
    /// Maximum number of objects to list
    pub limit: usize,
    /// Groups extracted in parallel
    pub concurrency: usize,
    /// Extract rows but do not write them
    pub dry_run: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_ROOT.to_string(),
            limit: DEFAULT_LIST_LIMIT,
            concurrency: DEFAULT_CONCURRENCY,
            dry_run: false,
        }
    }
}

/// A group that produced no row
#[derive(Debug, Clone)]
pub struct GroupFailure {
    pub key: GroupKey,
    /// Category or JSON key at fault
    pub missing_key: String,
    pub message: String,
    /// Missing data, as opposed to a download or decode failure
    pub incomplete: bool,
}

impl GroupFailure {
    fn new(key: GroupKey, err: &ExtractionError) -> Self {
        Self {
            key,
            missing_key: err.missing_key(),
            message: err.to_string(),
            incomplete: err.is_incomplete(),
        }
    }
}

/// Counts and failures of one run
#[derive(Debug, Default)]
pub struct RunReport {
    /// Objects returned by the listing
    pub listed: usize,
    /// Objects that matched the export layout
    pub matched: usize,
    pub pattern_mismatch: usize,
    /// Skipped objects per unknown category folder
    pub unknown_categories: BTreeMap<String, usize>,
    pub undated: usize,
    pub groups: usize,
    pub extracted: usize,
    pub failures: Vec<GroupFailure>,
    pub written: usize,
    pub dry_run: bool,
}

impl RunReport {
    /// Objects left out before grouping, for any reason
    pub fn skipped(&self) -> usize {
        self.pattern_mismatch + self.unknown_categories.values().sum::<usize>() + self.undated
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    fn record_skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::PatternMismatch => self.pattern_mismatch += 1,
            SkipReason::UnknownCategory(name) => {
                *self.unknown_categories.entry(name).or_default() += 1
            }
            SkipReason::MissingDate => self.undated += 1,
        }
    }
}

/// Ingestion pipeline over a blob source and a summary table
pub struct Pipeline {
    blobs: SharedBlobStore,
    store: SharedSummaryStore,
    parser: PathParser,
    progress: SharedProgress,
}

impl Pipeline {
    pub fn new(blobs: SharedBlobStore, store: SharedSummaryStore) -> Self {
        Self {
            blobs,
            store,
            parser: PathParser::default(),
            progress: Arc::new(IngestProgress::silent()),
        }
    }

    /// Use a parser for a different export root
    pub fn with_parser(mut self, parser: PathParser) -> Self {
        self.parser = parser;
        self
    }

    /// Report per-group progress through `progress`
    pub fn with_progress(mut self, progress: SharedProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn progress(&self) -> &SharedProgress {
        &self.progress
    }

    /// List and group export files
    ///
    /// Listing failures are fatal. Objects outside the layout are only counted.
    pub async fn discover(&self, options: &IngestOptions, report: &mut RunReport) -> Result<FileGroup> {
        let paths = self.blobs.list_objects(&options.prefix, options.limit).await?;
        report.listed = paths.len();
        info!(
            bucket = self.blobs.bucket(),
            prefix = %options.prefix,
            listed = paths.len(),
            "listed export objects"
        );
        if paths.len() >= options.limit {
            warn!(limit = options.limit, "listing reached its limit, later objects are not ingested");
        }

        let mut matched = Vec::new();
        for path in paths {
            match self.parser.parse(&path) {
                ParseOutcome::Matched(file) => matched.push(file),
                ParseOutcome::Skipped(reason) => {
                    debug!(path = %path, reason = %reason, "skipping object");
                    report.record_skip(reason);
                }
            }
        }
        report.matched = matched.len();

        let grouped = group(matched);
        for path in &grouped.undated {
            debug!(path = %path, reason = %SkipReason::MissingDate, "skipping object");
            report.record_skip(SkipReason::MissingDate);
        }
        report.groups = grouped.groups.len();

        Ok(grouped.groups)
    }

    /// Extract one row per complete group using at most `concurrency` workers
    ///
    /// Rows come back in key order regardless of completion order. Failed
    /// groups are logged and recorded in the report.
    pub async fn extract_all(
        &self,
        groups: FileGroup,
        concurrency: usize,
        report: &mut RunReport,
    ) -> Result<Vec<AggregateRow>> {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        self.progress.set_total(groups.len() as u32);

        let mut handles = Vec::with_capacity(groups.len());
        for (key, paths) in groups {
            let semaphore = Arc::clone(&semaphore);
            let blobs = Arc::clone(&self.blobs);
            let progress = Arc::clone(&self.progress);
            let task_key = key.clone();

            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| SummaryError::Other(format!("worker pool closed: {}", e)))?;

                let outcome = extract_group(&task_key, &paths, blobs.as_ref()).await;
                match &outcome {
                    Ok(_) => progress.complete_one(task_key.to_string()),
                    Err(_) => progress.fail_one(task_key.to_string()),
                }
                Ok::<_, SummaryError>(outcome)
            });
            handles.push((key, handle));
        }

        let mut outcomes = BTreeMap::new();
        for (key, handle) in handles {
            let outcome = handle
                .await
                .map_err(|e| SummaryError::Other(format!("extraction task for {} failed: {}", key, e)))??;
            outcomes.insert(key, outcome);
        }

        let mut rows = Vec::with_capacity(outcomes.len());
        for (key, outcome) in outcomes {
            match outcome {
                Ok(row) => rows.push(row),
                Err(err) => {
                    warn!(
                        usage_id = %key.usage_id,
                        date = %key.date,
                        missing_key = %err.missing_key(),
                        error = %err,
                        "excluding group"
                    );
                    report.failures.push(GroupFailure::new(key, &err));
                }
            }
        }
        report.extracted = rows.len();

        Ok(rows)
    }

    /// Run a full ingestion
    pub async fn run(&self, options: &IngestOptions) -> Result<RunReport> {
        let mut report = RunReport {
            dry_run: options.dry_run,
            ..Default::default()
        };

        let groups = self.discover(options, &mut report).await?;
        let rows = self.extract_all(groups, options.concurrency, &mut report).await?;

        if rows.is_empty() || options.dry_run {
            info!(rows = rows.len(), dry_run = options.dry_run, "nothing written");
            return Ok(report);
        }

        report.written = self.store.upsert_all(&rows).await?;
        info!(
            store = %self.store.describe(),
            written = report.written,
            failed = report.failed(),
            "ingestion finished"
        );

        Ok(report)
    }
}
