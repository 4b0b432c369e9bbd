//! Object path parsing for the export bucket layout
//!
//! Export files live at `<root>/<user_id>/<usage_id>/<category>/<filename>.json`.
//! Anything else in the bucket is skipped with a [`SkipReason`] rather than
//! treated as an error.

use std::fmt;

use regex::Regex;

use crate::models::{Category, ParsedFileRef};

/// Top-level folder of the Fitbit exports
pub const DEFAULT_ROOT: &str = "fitbit";

/// Why an object was left out of grouping
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Path does not follow the export layout
    PatternMismatch,
    /// Layout matched but the category folder is not one we aggregate
    UnknownCategory(String),
    /// Filename carries no recognizable date
    MissingDate,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::PatternMismatch => write!(f, "path does not match export layout"),
            SkipReason::UnknownCategory(name) => write!(f, "unknown category '{}'", name),
            SkipReason::MissingDate => write!(f, "no date in filename"),
        }
    }
}

/// Result of parsing one object path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Matched(ParsedFileRef),
    Skipped(SkipReason),
}

impl ParseOutcome {
    pub fn matched(self) -> Option<ParsedFileRef> {
        match self {
            ParseOutcome::Matched(r) => Some(r),
            ParseOutcome::Skipped(_) => None,
        }
    }
}

/// Matches object paths against the export layout
#[derive(Debug, Clone)]
pub struct PathParser {
    pattern: Regex,
}

impl Default for PathParser {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

impl PathParser {
    /// Build a parser for exports stored under `root`
    pub fn new(root: &str) -> Self {
        let pattern = format!(
            r"^{}/(?P<user_id>[^/]+)/(?P<usage_id>[^/]+)/(?P<category>[^/]+)/(?P<filename>[^/]+\.json)$",
            regex::escape(root.trim_matches('/'))
        );
        // root is escaped, so the pattern is always valid
        let pattern = Regex::new(&pattern).expect("export path pattern is valid");
        Self { pattern }
    }

    /// Parse an object path into its layout components
    pub fn parse(&self, path: &str) -> ParseOutcome {
        let caps = match self.pattern.captures(path) {
            Some(caps) => caps,
            None => return ParseOutcome::Skipped(SkipReason::PatternMismatch),
        };

        let category_name = &caps["category"];
        let category = match Category::from_dir_name(category_name) {
            Some(category) => category,
            None => {
                return ParseOutcome::Skipped(SkipReason::UnknownCategory(
                    category_name.to_string(),
                ))
            }
        };

        ParseOutcome::Matched(ParsedFileRef {
            user_id: caps["user_id"].to_string(),
            usage_id: caps["usage_id"].to_string(),
            category,
            filename: caps["filename"].to_string(),
            path: path.to_string(),
        })
    }
}
