//! Supabase Storage bucket access

use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{join_path, BlobStore};
use crate::client::SupabaseClient;
use crate::error::{Result, SummaryError};

/// Characters escaped inside a single object path segment
const SEGMENT_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'?')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListRequest<'a> {
    prefix: &'a str,
    limit: usize,
    offset: usize,
    sort_by: SortBy,
}

#[derive(Debug, Serialize)]
struct SortBy {
    column: &'static str,
    order: &'static str,
}

/// One listing entry; folders have no `id`
#[derive(Debug, Deserialize)]
struct ListEntry {
    name: String,
    #[serde(default)]
    id: Option<String>,
}

/// Entries requested per folder listing page
pub const LIST_PAGE_SIZE: usize = 1000;

/// Objects in one Supabase Storage bucket
pub struct StorageClient {
    http: SupabaseClient,
    bucket: String,
    page_size: usize,
}

impl StorageClient {
    pub fn new(http: SupabaseClient, bucket: impl Into<String>) -> Self {
        Self {
            http,
            bucket: bucket.into(),
            page_size: LIST_PAGE_SIZE,
        }
    }

    /// Override the folder listing page size
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// List one page of the direct children of a folder
    async fn list_page(&self, prefix: &str, offset: usize) -> Result<Vec<ListEntry>> {
        let body = ListRequest {
            prefix,
            limit: self.page_size,
            offset,
            sort_by: SortBy {
                column: "name",
                order: "asc",
            },
        };
        let path = format!("/storage/v1/object/list/{}", encode_segment(&self.bucket));
        self.http.post_json(&path, &body).await
    }
}

#[async_trait]
impl BlobStore for StorageClient {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Walk folders depth-first until `limit` files have been collected
    ///
    /// Every folder is read page by page, so `limit` only caps files and never
    /// hides subfolders.
    async fn list_objects(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let mut files = Vec::new();
        let mut pending = vec![prefix.trim_matches('/').to_string()];

        while let Some(folder) = pending.pop() {
            if files.len() >= limit {
                break;
            }

            let mut subfolders = Vec::new();
            let mut offset = 0;
            loop {
                let entries = self.list_page(&folder, offset).await?;
                let count = entries.len();
                debug!(folder = %folder, offset, entries = count, "listed storage folder page");

                for entry in entries {
                    let full = join_path(&folder, &entry.name);
                    if entry.id.is_some() {
                        files.push(full);
                    } else {
                        subfolders.push(full);
                    }
                }

                if count < self.page_size {
                    break;
                }
                offset += count;
            }
            pending.extend(subfolders.into_iter().rev());
        }

        files.sort();
        files.truncate(limit);
        Ok(files)
    }

    async fn download(&self, path: &str) -> Result<Bytes> {
        if path.is_empty() {
            return Err(SummaryError::invalid_param("empty object path"));
        }
        let url_path = format!(
            "/storage/v1/object/{}/{}",
            encode_segment(&self.bucket),
            encode_object_path(path)
        );
        self.http.download(&url_path).await
    }
}

fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT_ENCODE_SET).to_string()
}

/// Percent-encode each `/`-separated segment of an object path
fn encode_object_path(path: &str) -> String {
    path.trim_start_matches('/')
        .split('/')
        .map(encode_segment)
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RetryPolicy;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_store(server: &MockServer) -> StorageClient {
        let http = SupabaseClient::with_base_url(&server.uri(), "test-key")
            .unwrap()
            .with_retry(RetryPolicy::none());
        StorageClient::new(http, "fitbit")
    }

    fn file(name: &str) -> serde_json::Value {
        json!({ "name": name, "id": format!("id-{}", name), "metadata": { "size": 10 } })
    }

    fn folder(name: &str) -> serde_json::Value {
        json!({ "name": name, "id": null, "metadata": null })
    }

    async fn mount_folder(server: &MockServer, prefix: &str, entries: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/list/fitbit"))
            .and(body_partial_json(json!({ "prefix": prefix })))
            .respond_with(ResponseTemplate::new(200).set_body_json(entries))
            .mount(server)
            .await;
    }

    #[test]
    fn test_encode_object_path() {
        assert_eq!(
            encode_object_path("fitbit/u 1/s#1/heart/heart_2024-08-09.json"),
            "fitbit/u%201/s%231/heart/heart_2024-08-09.json"
        );
    }

    #[tokio::test]
    async fn test_list_walks_folders() {
        let server = MockServer::start().await;

        mount_folder(&server, "", json!([folder("fitbit"), file("README.md")])).await;
        mount_folder(&server, "fitbit", json!([folder("u1")])).await;
        mount_folder(&server, "fitbit/u1", json!([folder("s1")])).await;
        mount_folder(&server, "fitbit/u1/s1", json!([folder("heart"), folder("steps")])).await;
        mount_folder(
            &server,
            "fitbit/u1/s1/heart",
            json!([file("heart_20240809.json")]),
        )
        .await;
        mount_folder(
            &server,
            "fitbit/u1/s1/steps",
            json!([file("steps_20240809.json"), file("steps_20240810.json")]),
        )
        .await;

        let objects = test_store(&server).list_objects("", 100).await.unwrap();
        assert_eq!(
            objects,
            vec![
                "README.md",
                "fitbit/u1/s1/heart/heart_20240809.json",
                "fitbit/u1/s1/steps/steps_20240809.json",
                "fitbit/u1/s1/steps/steps_20240810.json",
            ]
        );
    }

    #[tokio::test]
    async fn test_list_respects_limit() {
        let server = MockServer::start().await;

        mount_folder(
            &server,
            "fitbit/u1/s1/steps",
            json!([file("a.json"), file("b.json"), file("c.json")]),
        )
        .await;

        let objects = test_store(&server)
            .list_objects("fitbit/u1/s1/steps", 2)
            .await
            .unwrap();
        assert_eq!(objects.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_subfolders_do_not_use_up_limit() {
        let server = MockServer::start().await;

        mount_folder(
            &server,
            "fitbit/u1/s1",
            json!([folder("a_empty"), folder("b_empty"), folder("heart")]),
        )
        .await;
        mount_folder(&server, "fitbit/u1/s1/a_empty", json!([])).await;
        mount_folder(&server, "fitbit/u1/s1/b_empty", json!([])).await;
        mount_folder(&server, "fitbit/u1/s1/heart", json!([file("heart_20240809.json")])).await;

        let objects = test_store(&server)
            .list_objects("fitbit/u1/s1", 2)
            .await
            .unwrap();
        assert_eq!(objects, vec!["fitbit/u1/s1/heart/heart_20240809.json"]);

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["limit"], LIST_PAGE_SIZE);
    }

    #[tokio::test]
    async fn test_list_follows_pages() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/storage/v1/object/list/fitbit"))
            .and(body_partial_json(json!({ "prefix": "fitbit/u1/s1", "limit": 2, "offset": 0 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([folder("br"), folder("calories")])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/list/fitbit"))
            .and(body_partial_json(json!({ "prefix": "fitbit/u1/s1", "limit": 2, "offset": 2 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([folder("heart")])))
            .mount(&server)
            .await;
        for category in ["br", "calories", "heart"] {
            mount_folder(
                &server,
                &format!("fitbit/u1/s1/{}", category),
                json!([file(&format!("{}_20240809.json", category))]),
            )
            .await;
        }

        let objects = test_store(&server)
            .with_page_size(2)
            .list_objects("fitbit/u1/s1", 100)
            .await
            .unwrap();
        assert_eq!(
            objects,
            vec![
                "fitbit/u1/s1/br/br_20240809.json",
                "fitbit/u1/s1/calories/calories_20240809.json",
                "fitbit/u1/s1/heart/heart_20240809.json",
            ]
        );
    }

    #[tokio::test]
    async fn test_list_failure_propagates() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = test_store(&server).list_objects("", 10).await.unwrap_err();
        assert!(matches!(err, SummaryError::NotAuthenticated));
    }

    #[tokio::test]
    async fn test_download_object() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/storage/v1/object/fitbit/fitbit/u1/s1/hrv/hrv_2024-08-09.json"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"hrv\":[]}"))
            .mount(&server)
            .await;

        let bytes = test_store(&server)
            .download("fitbit/u1/s1/hrv/hrv_2024-08-09.json")
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"{\"hrv\":[]}");
    }
}
