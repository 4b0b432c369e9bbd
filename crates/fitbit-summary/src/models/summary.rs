//! Data models for Fitbit export files and the daily summary table
//!
//! These structures describe the objects found in the export bucket and the
//! rows written to `data_summary`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Metric domain of an export file, taken from its parent directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Breathing rate during sleep
    Br,
    Calories,
    /// Resting heart rate
    Heart,
    /// Heart rate variability during sleep
    Hrv,
    Steps,
}

impl Category {
    /// Every category a complete summary row needs
    pub const ALL: [Category; 5] = [
        Category::Br,
        Category::Calories,
        Category::Heart,
        Category::Hrv,
        Category::Steps,
    ];

    /// Directory name used in the export bucket
    pub fn dir_name(&self) -> &'static str {
        match self {
            Category::Br => "br",
            Category::Calories => "calories",
            Category::Heart => "heart",
            Category::Hrv => "hrv",
            Category::Steps => "steps",
        }
    }

    /// Look up a category by its directory name
    pub fn from_dir_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.dir_name() == name)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// An export file whose path matched the bucket layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFileRef {
    pub user_id: String,
    pub usage_id: String,
    pub category: Category,
    pub filename: String,
    /// Full object path, unique per blob
    pub path: String,
}

/// Identifies one summary row
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub usage_id: String,
    pub date: NaiveDate,
}

impl GroupKey {
    pub fn new(usage_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            usage_id: usage_id.into(),
            date,
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.usage_id, self.date)
    }
}

/// Object path per category for a single group
pub type CategoryPaths = BTreeMap<Category, String>;

/// All groups discovered in one run, in key order
pub type FileGroup = BTreeMap<GroupKey, CategoryPaths>;

/// One row of `data_summary`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub usage_id: String,
    /// Serialized as `YYYY-MM-DD`
    pub date: NaiveDate,
    pub calories_total: i64,
    pub steps_total: i64,
    /// Resting heart rate in bpm
    pub rhr: f64,
    /// Breathing rate over the full night, breaths per minute
    pub br_sleep: f64,
    /// Mean nightly RMSSD in ms
    pub hrv_sleep: f64,
}

impl AggregateRow {
    pub fn key(&self) -> GroupKey {
        GroupKey::new(self.usage_id.clone(), self.date)
    }
}

/// Filter for reading summary rows back
#[derive(Debug, Clone, Default)]
pub struct SummaryQuery {
    pub usage_id: String,
    /// Inclusive lower bound
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound
    pub to: Option<NaiveDate>,
}

impl SummaryQuery {
    pub fn for_usage(usage_id: impl Into<String>) -> Self {
        Self {
            usage_id: usage_id.into(),
            ..Default::default()
        }
    }

    pub fn between(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    /// Whether a date falls inside the query range
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_dir_names() {
        for category in Category::ALL {
            assert_eq!(Category::from_dir_name(category.dir_name()), Some(category));
        }
        assert_eq!(Category::from_dir_name("sleep"), None);
        assert_eq!(Category::from_dir_name("Heart"), None);
    }

    #[test]
    fn test_group_key_ordering() {
        let a = GroupKey::new("S1", NaiveDate::from_ymd_opt(2024, 8, 10).unwrap());
        let b = GroupKey::new("S1", NaiveDate::from_ymd_opt(2024, 8, 9).unwrap());
        let c = GroupKey::new("S0", NaiveDate::from_ymd_opt(2024, 9, 1).unwrap());

        let mut keys = vec![a.clone(), b.clone(), c.clone()];
        keys.sort();
        assert_eq!(keys, vec![c, b, a]);
    }

    #[test]
    fn test_row_serializes_iso_date() {
        let row = AggregateRow {
            usage_id: "S1".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 8, 9).unwrap(),
            calories_total: 2000,
            steps_total: 9000,
            rhr: 58.0,
            br_sleep: 16.2,
            hrv_sleep: 42.0,
        };

        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["date"], "2024-08-09");
        assert_eq!(json["calories_total"], 2000);
    }

    #[test]
    fn test_query_range_is_inclusive() {
        let from = NaiveDate::from_ymd_opt(2024, 8, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 8, 31).unwrap();
        let query = SummaryQuery::for_usage("S1").between(Some(from), Some(to));

        assert!(query.contains(from));
        assert!(query.contains(to));
        assert!(!query.contains(NaiveDate::from_ymd_opt(2024, 9, 1).unwrap()));
        assert!(SummaryQuery::for_usage("S1").contains(from));
    }
}
