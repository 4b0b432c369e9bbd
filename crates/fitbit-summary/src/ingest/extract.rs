//! Per-category metric extraction
//!
//! Each category file contributes exactly one scalar to the summary row. The
//! navigation for every category is a fixed [`JsonPath`]; HRV additionally
//! averages `rmssd` across all minute entries of the first night.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use crate::blob::BlobStore;
use crate::error::SummaryError;
use crate::ingest::json_path::{type_name, JsonPath, PathError, Step};
use crate::models::{AggregateRow, Category, CategoryPaths, GroupKey};

const CALORIES_VALUE: JsonPath = JsonPath::new(&[
    Step::Key("activities-calories"),
    Step::Index(0),
    Step::Key("value"),
]);

const STEPS_VALUE: JsonPath = JsonPath::new(&[
    Step::Key("activities-steps"),
    Step::Index(0),
    Step::Key("value"),
]);

const HEART_VALUE: JsonPath = JsonPath::new(&[
    Step::Key("activities-heart"),
    Step::Index(0),
    Step::Key("value"),
]);

/// Used when the heart `value` is the full daily object instead of a scalar
const HEART_RESTING: JsonPath = JsonPath::new(&[
    Step::Key("activities-heart"),
    Step::Index(0),
    Step::Key("value"),
    Step::Key("restingHeartRate"),
]);

const BR_SLEEP: JsonPath = JsonPath::new(&[
    Step::Key("br"),
    Step::Index(0),
    Step::Key("value"),
    Step::Key("fullSleepSummary"),
    Step::Key("breathingRate"),
]);

const HRV_MINUTES: JsonPath = JsonPath::new(&[
    Step::Key("hrv"),
    Step::Index(0),
    Step::Key("minutes"),
]);

const MINUTE_RMSSD: JsonPath = JsonPath::new(&[Step::Key("value"), Step::Key("rmssd")]);

/// Why a group produced no summary row
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("missing {0} file")]
    MissingCategory(Category),

    #[error("{category}: {source}")]
    MissingField {
        category: Category,
        #[source]
        source: PathError,
    },

    #[error("{category}: expected {expected} at {path}, found {found}")]
    InvalidValue {
        category: Category,
        path: String,
        expected: &'static str,
        found: String,
    },

    #[error("hrv: no rmssd readings at {0}")]
    EmptyHrv(String),

    #[error("{category}: invalid JSON in {path}: {source}")]
    InvalidJson {
        category: Category,
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{category}: failed to download {path}: {source}")]
    Transport {
        category: Category,
        path: String,
        #[source]
        source: SummaryError,
    },
}

impl ExtractionError {
    /// The category file or JSON key that was missing or unusable
    pub fn missing_key(&self) -> String {
        match self {
            ExtractionError::MissingCategory(category) => category.to_string(),
            ExtractionError::MissingField { category, source } => {
                format!("{}:{}", category, source.path)
            }
            ExtractionError::InvalidValue { category, path, .. } => format!("{}:{}", category, path),
            ExtractionError::EmptyHrv(path) => format!("hrv:{}", path),
            ExtractionError::InvalidJson { category, path, .. }
            | ExtractionError::Transport { category, path, .. } => format!("{}:{}", category, path),
        }
    }

    /// Data-shape problems, as opposed to download or decode failures
    pub fn is_incomplete(&self) -> bool {
        !matches!(
            self,
            ExtractionError::InvalidJson { .. } | ExtractionError::Transport { .. }
        )
    }

    fn field(category: Category, source: PathError) -> Self {
        ExtractionError::MissingField { category, source }
    }
}

type ExtractResult<T> = std::result::Result<T, ExtractionError>;

/// Parsed category documents for one group
pub type CategoryDocs = BTreeMap<Category, Value>;

/// Download, parse and reduce every category file of a group into one row
///
/// Nothing is downloaded when a category is missing from the group.
pub async fn extract_group(
    key: &GroupKey,
    paths: &CategoryPaths,
    store: &dyn BlobStore,
) -> ExtractResult<AggregateRow> {
    if let Some(missing) = Category::ALL.into_iter().find(|c| !paths.contains_key(c)) {
        return Err(ExtractionError::MissingCategory(missing));
    }

    let mut docs = CategoryDocs::new();
    for (category, path) in paths {
        let bytes = store
            .download(path)
            .await
            .map_err(|source| ExtractionError::Transport {
                category: *category,
                path: path.clone(),
                source,
            })?;
        let doc: Value =
            serde_json::from_slice(&bytes).map_err(|source| ExtractionError::InvalidJson {
                category: *category,
                path: path.clone(),
                source,
            })?;
        docs.insert(*category, doc);
    }

    assemble_row(key, &docs)
}

/// Build a row from already parsed documents
pub fn assemble_row(key: &GroupKey, docs: &CategoryDocs) -> ExtractResult<AggregateRow> {
    let doc = |category: Category| {
        docs.get(&category)
            .ok_or(ExtractionError::MissingCategory(category))
    };

    Ok(AggregateRow {
        usage_id: key.usage_id.clone(),
        date: key.date,
        calories_total: calories_total(doc(Category::Calories)?)?,
        steps_total: steps_total(doc(Category::Steps)?)?,
        rhr: resting_heart_rate(doc(Category::Heart)?)?,
        br_sleep: breathing_rate(doc(Category::Br)?)?,
        hrv_sleep: hrv_mean(doc(Category::Hrv)?)?,
    })
}

/// `activities-calories[0].value`, truncated to whole calories
pub fn calories_total(doc: &Value) -> ExtractResult<i64> {
    let value = resolve(Category::Calories, CALORIES_VALUE, doc)?;
    let calories = number(Category::Calories, &CALORIES_VALUE.to_string(), value)?;
    truncate(Category::Calories, &CALORIES_VALUE.to_string(), calories)
}

/// `activities-steps[0].value` as an integer
pub fn steps_total(doc: &Value) -> ExtractResult<i64> {
    let value = resolve(Category::Steps, STEPS_VALUE, doc)?;
    let path = STEPS_VALUE.to_string();

    let steps = match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(i),
            None => n.as_f64().and_then(|f| truncate(Category::Steps, &path, f).ok()),
        },
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    steps.ok_or_else(|| invalid(Category::Steps, &path, "an integer", value))
}

/// `activities-heart[0].value`, or its `restingHeartRate` when it is an object
pub fn resting_heart_rate(doc: &Value) -> ExtractResult<f64> {
    let value = resolve(Category::Heart, HEART_VALUE, doc)?;
    if value.is_object() {
        let resting = resolve(Category::Heart, HEART_RESTING, doc)?;
        return number(Category::Heart, &HEART_RESTING.to_string(), resting);
    }
    number(Category::Heart, &HEART_VALUE.to_string(), value)
}

/// `br[0].value.fullSleepSummary.breathingRate`
pub fn breathing_rate(doc: &Value) -> ExtractResult<f64> {
    let value = resolve(Category::Br, BR_SLEEP, doc)?;
    number(Category::Br, &BR_SLEEP.to_string(), value)
}

/// Mean of the non-null `value.rmssd` readings in `hrv[0].minutes`
pub fn hrv_mean(doc: &Value) -> ExtractResult<f64> {
    let minutes = resolve(Category::Hrv, HRV_MINUTES, doc)?;
    let base = HRV_MINUTES.to_string();

    let entries = minutes
        .as_array()
        .ok_or_else(|| invalid(Category::Hrv, &base, "an array", minutes))?;
    if entries.is_empty() {
        return Err(ExtractionError::EmptyHrv(base));
    }

    let mut sum = 0.0;
    let mut counted = 0usize;
    for (i, entry) in entries.iter().enumerate() {
        let location = format!("{}[{}]", base, i);
        let rmssd = MINUTE_RMSSD
            .resolve(entry)
            .map_err(|e| ExtractionError::field(Category::Hrv, e.within(&location)))?;
        // null readings do not contribute to the mean
        if rmssd.is_null() {
            continue;
        }
        sum += number(Category::Hrv, &format!("{}.{}", location, MINUTE_RMSSD), rmssd)?;
        counted += 1;
    }

    if counted == 0 {
        return Err(ExtractionError::EmptyHrv(base));
    }
    Ok(sum / counted as f64)
}

fn resolve<'a>(category: Category, path: JsonPath, doc: &'a Value) -> ExtractResult<&'a Value> {
    path.resolve(doc)
        .map_err(|e| ExtractionError::field(category, e))
}

/// Finite number, either as a JSON number or a numeric string
fn number(category: Category, path: &str, value: &Value) -> ExtractResult<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    parsed
        .filter(|f| f.is_finite())
        .ok_or_else(|| invalid(category, path, "a number", value))
}

/// Truncate toward zero
fn truncate(category: Category, path: &str, value: f64) -> ExtractResult<i64> {
    let truncated = value.trunc();
    if truncated.abs() < i64::MAX as f64 {
        Ok(truncated as i64)
    } else {
        Err(ExtractionError::InvalidValue {
            category,
            path: path.to_string(),
            expected: "an integer in range",
            found: value.to_string(),
        })
    }
}

fn invalid(category: Category, path: &str, expected: &'static str, found: &Value) -> ExtractionError {
    let found = match found {
        Value::String(s) => format!("string \"{}\"", s),
        other => type_name(other).to_string(),
    };
    ExtractionError::InvalidValue {
        category,
        path: path.to_string(),
        expected,
        found,
    }
}
