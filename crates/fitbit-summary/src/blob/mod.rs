//! Raw export object access
//!
//! A [`BlobStore`] is bound to one bucket at construction time and exposes the
//! two operations the pipeline needs: listing object paths and downloading a
//! single object.
//!
//! - [`StorageClient`]: Supabase Storage over HTTP
//! - [`LocalBlobStore`]: a directory on disk laid out like the bucket

mod local;
mod supabase;

pub use local::LocalBlobStore;
pub use supabase::StorageClient;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Source of raw export files
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Bucket name, for log and error context
    fn bucket(&self) -> &str;

    /// List object paths under `prefix`, at most `limit` of them, sorted by path
    async fn list_objects(&self, prefix: &str, limit: usize) -> Result<Vec<String>>;

    /// Fetch one object's bytes
    async fn download(&self, path: &str) -> Result<Bytes>;
}

pub type SharedBlobStore = Arc<dyn BlobStore>;

/// Join a listing prefix and an entry name
pub(crate) fn join_path(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}
