//! Bucketing of parsed export files by (usage id, date)

use crate::ingest::date::extract_date;
use crate::models::{FileGroup, GroupKey, ParsedFileRef};

/// Output of [`group`]: the groups plus the files that carried no date
#[derive(Debug, Default)]
pub struct Grouped {
    pub groups: FileGroup,
    /// Paths dropped because their filename has no date
    pub undated: Vec<String>,
}

/// Group file references by usage id and filename date
///
/// When two files land on the same (usage id, date, category), the
/// lexicographically greatest path is kept, so the result does not depend on
/// input order.
pub fn group(refs: impl IntoIterator<Item = ParsedFileRef>) -> Grouped {
    let mut grouped = Grouped::default();

    for file in refs {
        let date = match extract_date(&file.filename) {
            Some(date) => date,
            None => {
                grouped.undated.push(file.path);
                continue;
            }
        };

        let categories = grouped
            .groups
            .entry(GroupKey::new(file.usage_id, date))
            .or_default();

        match categories.get(&file.category) {
            Some(existing) if *existing >= file.path => {}
            _ => {
                categories.insert(file.category, file.path);
            }
        }
    }

    grouped.undated.sort();
    grouped
}
