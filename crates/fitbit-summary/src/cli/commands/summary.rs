//! Summary read commands for fitbit-summary

use chrono::NaiveDate;

use crate::cli::OutputFormat;
use crate::config::IngestConfig;
use crate::error::{Result, SummaryError};
use crate::models::{AggregateRow, SummaryQuery};

use super::{open_summary_store, StoreTarget};

const CSV_HEADER: &str = "usage_id,date,calories_total,steps_total,rhr,br_sleep,hrv_sleep";

/// Print summary rows for one usage id
pub async fn rows(
    config: &IngestConfig,
    target: &StoreTarget,
    usage_id: String,
    from: Option<String>,
    to: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let from = from.as_deref().map(parse_date).transpose()?;
    let to = to.as_deref().map(parse_date).transpose()?;
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(SummaryError::invalid_param(format!(
                "--from {} is after --to {}",
                from, to
            )));
        }
    }

    let store = open_summary_store(config, target)?;
    let query = SummaryQuery::for_usage(usage_id).between(from, to);
    let rows = store.fetch_rows(&query).await?;

    if rows.is_empty() && format == OutputFormat::Table {
        println!("No summary rows for {}", query.usage_id);
        return Ok(());
    }

    print!("{}", render(&rows, format)?);
    Ok(())
}

/// Print the usage ids present in the table
pub async fn users(config: &IngestConfig, target: &StoreTarget, format: OutputFormat) -> Result<()> {
    let store = open_summary_store(config, target)?;
    let ids = store.usage_ids().await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&ids)?),
        OutputFormat::Csv => {
            println!("usage_id");
            for id in &ids {
                println!("{}", csv_field(id));
            }
        }
        OutputFormat::Table => {
            if ids.is_empty() {
                println!("No usage ids found");
                return Ok(());
            }
            println!("Usage IDs ({})", ids.len());
            println!("{}", "-".repeat(30));
            for id in &ids {
                println!("{}", id);
            }
        }
    }

    Ok(())
}

/// Render rows in the requested format
pub fn render(rows: &[AggregateRow], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(render_table(rows)),
        OutputFormat::Json => render_json(rows),
        OutputFormat::Csv => Ok(render_csv(rows)),
    }
}

pub fn render_table(rows: &[AggregateRow]) -> String {
    let mut out = format!(
        "{:<12} {:>10} {:>10} {:>8} {:>8} {:>8}\n",
        "Date", "Calories", "Steps", "RHR", "BR", "HRV"
    );
    out.push_str(&"-".repeat(61));
    out.push('\n');
    for row in rows {
        out.push_str(&format!(
            "{:<12} {:>10} {:>10} {:>8.1} {:>8.1} {:>8.1}\n",
            row.date.to_string(),
            row.calories_total,
            row.steps_total,
            row.rhr,
            row.br_sleep,
            row.hrv_sleep
        ));
    }
    out
}

pub fn render_json(rows: &[AggregateRow]) -> Result<String> {
    let mut out = serde_json::to_string_pretty(rows)?;
    out.push('\n');
    Ok(out)
}

pub fn render_csv(rows: &[AggregateRow]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for row in rows {
        out.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            csv_field(&row.usage_id),
            row.date,
            row.calories_total,
            row.steps_total,
            row.rhr,
            row.br_sleep,
            row.hrv_sleep
        ));
    }
    out
}

/// Quote a field when it contains a separator, quote or newline
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| SummaryError::InvalidDateFormat(s.to_string()))
}
