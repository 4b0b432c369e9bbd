//! Ingest command for fitbit-summary

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::IngestConfig;
use crate::error::{Result, SummaryError};
use crate::ingest::{IngestOptions, IngestProgress, Pipeline, RunReport};

use super::{open_blob_store, open_summary_store, table_name, StoreTarget};

/// Failures listed individually before the rest are summarized
const MAX_LISTED_FAILURES: usize = 20;

/// Command-line arguments of `ingest`
#[derive(Debug, Clone, Default)]
pub struct IngestArgs {
    pub prefix: Option<String>,
    pub limit: Option<usize>,
    pub concurrency: usize,
    pub dry_run: bool,
    pub local: Option<PathBuf>,
    pub store: Option<StoreTarget>,
    /// Print a status line per group
    pub progress: bool,
}

/// Run one ingestion and print its report
pub async fn run(config: &IngestConfig, args: IngestArgs) -> Result<()> {
    if args.concurrency == 0 {
        return Err(SummaryError::invalid_param("--concurrency must be at least 1"));
    }

    let limit = match args.limit {
        Some(0) => return Err(SummaryError::invalid_param("--limit must be at least 1")),
        Some(limit) => limit,
        None => config.list_limit()?,
    };

    let target = args.store.clone().unwrap_or(StoreTarget::Remote);
    let blobs = open_blob_store(config, args.local.clone())?;
    let store = open_summary_store(config, &target)?;

    let options = IngestOptions {
        prefix: args.prefix.clone().unwrap_or_else(|| IngestOptions::default().prefix),
        limit,
        concurrency: args.concurrency,
        dry_run: args.dry_run,
    };

    println!("Source: {} (prefix '{}')", blobs.bucket(), options.prefix);
    println!("Target: {}", store.describe());
    if options.dry_run {
        println!("Dry run mode - no changes will be made");
    }

    let pipeline =
        Pipeline::new(blobs, store).with_progress(Arc::new(IngestProgress::new(args.progress)));
    let report = pipeline.run(&options).await?;
    if args.progress && report.groups > 0 {
        println!();
    }

    print_report(&report);
    println!("{}", final_message(&report, &table_name(config, &target)));

    Ok(())
}

fn print_report(report: &RunReport) {
    println!();
    println!("{:<20} {:>8}", "Listed objects:", report.listed);
    println!("{:<20} {:>8}", "Matched layout:", report.matched);
    println!("{:<20} {:>8}", "Skipped:", report.skipped());
    if report.skipped() > 0 {
        println!("  {:<18} {:>8}", "layout mismatch", report.pattern_mismatch);
        for (name, count) in &report.unknown_categories {
            println!("  {:<18} {:>8}", format!("category '{}'", name), count);
        }
        println!("  {:<18} {:>8}", "no date", report.undated);
    }
    println!("{:<20} {:>8}", "Groups:", report.groups);
    println!("{:<20} {:>8}", "Rows extracted:", report.extracted);
    println!("{:<20} {:>8}", "Groups excluded:", report.failed());

    if !report.failures.is_empty() {
        println!();
        println!("{:<16} {:<12} {:<40}", "Usage ID", "Date", "Missing");
        println!("{}", "-".repeat(70));
        for failure in report.failures.iter().take(MAX_LISTED_FAILURES) {
            println!(
                "{:<16} {:<12} {:<40}",
                failure.key.usage_id,
                failure.key.date.to_string(),
                failure.missing_key
            );
        }
        if report.failures.len() > MAX_LISTED_FAILURES {
            println!("... and {} more", report.failures.len() - MAX_LISTED_FAILURES);
        }
    }
    println!();
}

/// The closing line of a run
pub fn final_message(report: &RunReport, table: &str) -> String {
    if report.dry_run && report.extracted > 0 {
        format!("Dry run: {} rows would be upserted into {}", report.extracted, table)
    } else if report.written == 0 {
        "No data to insert.".to_string()
    } else {
        format!("{} rows upserted into {}", report.written, table)
    }
}
