pub mod blob;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod ingest;
pub mod models;
pub mod storage;

pub use error::{Result, SummaryError};
