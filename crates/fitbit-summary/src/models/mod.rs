mod summary;

pub use summary::{
    AggregateRow, Category, CategoryPaths, FileGroup, GroupKey, ParsedFileRef, SummaryQuery,
};
