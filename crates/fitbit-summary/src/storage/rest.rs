//! PostgREST-backed summary table

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::client::SupabaseClient;
use crate::error::Result;
use crate::models::{AggregateRow, SummaryQuery};
use crate::storage::{SummaryStore, DEFAULT_CHUNK_SIZE};

/// Conflict target of the upsert
const CONFLICT_COLUMNS: &str = "date,usage_id";

const UPSERT_PREFER: (&str, &str) = ("prefer", "resolution=merge-duplicates,return=minimal");

/// Hosted `data_summary` table
#[derive(Clone)]
pub struct RestSummaryStore {
    http: SupabaseClient,
    table: String,
    chunk_size: usize,
}

#[derive(Deserialize)]
struct UsageIdRow {
    usage_id: Option<String>,
}

impl RestSummaryStore {
    pub fn new(http: SupabaseClient, table: impl Into<String>) -> Self {
        Self {
            http,
            table: table.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Override the number of rows sent per request
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn table_path(&self) -> String {
        format!("/rest/v1/{}", self.table)
    }
}

#[async_trait]
impl SummaryStore for RestSummaryStore {
    fn describe(&self) -> String {
        format!("rest:{}", self.table)
    }

    async fn upsert_all(&self, rows: &[AggregateRow]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let path = format!("{}?on_conflict={}", self.table_path(), CONFLICT_COLUMNS);
        let mut written = 0;
        for chunk in rows.chunks(self.chunk_size) {
            self.http.post(&path, chunk, &[UPSERT_PREFER]).await?;
            written += chunk.len();
            debug!(table = %self.table, written, total = rows.len(), "upserted chunk");
        }
        Ok(written)
    }

    async fn usage_ids(&self) -> Result<Vec<String>> {
        let rows: Vec<UsageIdRow> = self
            .http
            .get_json(
                &self.table_path(),
                &[
                    ("select", "usage_id".to_string()),
                    ("order", "usage_id.asc".to_string()),
                ],
            )
            .await?;

        let ids: BTreeSet<String> = rows
            .into_iter()
            .filter_map(|r| r.usage_id)
            .filter(|id| !id.is_empty())
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn fetch_rows(&self, query: &SummaryQuery) -> Result<Vec<AggregateRow>> {
        let mut params = vec![
            ("select", "*".to_string()),
            ("usage_id", format!("eq.{}", query.usage_id)),
        ];
        if let Some(from) = query.from {
            params.push(("date", format!("gte.{}", from)));
        }
        if let Some(to) = query.to {
            params.push(("date", format!("lte.{}", to)));
        }
        params.push(("order", "date.asc".to_string()));

        self.http.get_json(&self.table_path(), &params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RetryPolicy;
    use crate::error::SummaryError;
    use chrono::NaiveDate;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(server: &MockServer) -> RestSummaryStore {
        let http = SupabaseClient::with_base_url(&server.uri(), "service-key")
            .unwrap()
            .with_retry(RetryPolicy::none());
        RestSummaryStore::new(http, "data_summary")
    }

    fn row(day: u32) -> AggregateRow {
        AggregateRow {
            usage_id: "S1".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 8, day).unwrap(),
            calories_total: 2000,
            steps_total: 9000,
            rhr: 58.0,
            br_sleep: 16.2,
            hrv_sleep: 42.0,
        }
    }

    #[tokio::test]
    async fn test_upsert_request_shape() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/data_summary"))
            .and(query_param("on_conflict", "date,usage_id"))
            .and(header("apikey", "service-key"))
            .and(body_json(json!([{
                "usage_id": "S1",
                "date": "2024-08-09",
                "calories_total": 2000,
                "steps_total": 9000,
                "rhr": 58.0,
                "br_sleep": 16.2,
                "hrv_sleep": 42.0
            }])))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(store(&server).upsert_all(&[row(9)]).await.unwrap(), 1);

        let requests = server.received_requests().await.unwrap();
        let prefer = requests[0].headers.get("prefer").unwrap();
        assert_eq!(prefer.to_str().unwrap(), "resolution=merge-duplicates,return=minimal");
    }

    #[tokio::test]
    async fn test_upsert_is_chunked() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/data_summary"))
            .respond_with(ResponseTemplate::new(201))
            .expect(3)
            .mount(&server)
            .await;

        let rows: Vec<_> = (1..=5).map(row).collect();
        let written = store(&server).with_chunk_size(2).upsert_all(&rows).await.unwrap();
        assert_eq!(written, 5);
    }

    #[tokio::test]
    async fn test_empty_upsert_sends_nothing() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        assert_eq!(store(&server).upsert_all(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upsert_failure_is_reported() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409).set_body_string("conflict"))
            .mount(&server)
            .await;

        let err = store(&server).upsert_all(&[row(9)]).await.unwrap_err();
        assert!(matches!(err, SummaryError::Api { status: 409, .. }));
    }

    #[tokio::test]
    async fn test_fetch_rows_query() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/data_summary"))
            .and(query_param("usage_id", "eq.S1"))
            .and(query_param("order", "date.asc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "usage_id": "S1",
                "date": "2024-08-09",
                "calories_total": 2000,
                "steps_total": 9000,
                "rhr": 58.0,
                "br_sleep": 16.2,
                "hrv_sleep": 42.0
            }])))
            .mount(&server)
            .await;

        let query = SummaryQuery::for_usage("S1").between(NaiveDate::from_ymd_opt(2024, 8, 1), None);
        let rows = store(&server).fetch_rows(&query).await.unwrap();
        assert_eq!(rows, vec![row(9)]);

        let requests = server.received_requests().await.unwrap();
        let url = requests[0].url.as_str();
        assert!(url.contains("date=gte.2024-08-01"));
        assert!(!url.contains("lte."));
    }

    #[tokio::test]
    async fn test_usage_ids_are_distinct() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/data_summary"))
            .and(query_param("select", "usage_id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "usage_id": "S1" },
                { "usage_id": "S1" },
                { "usage_id": "S2" }
            ])))
            .mount(&server)
            .await;

        assert_eq!(store(&server).usage_ids().await.unwrap(), vec!["S1", "S2"]);
    }

    #[tokio::test]
    async fn test_usage_ids_skip_null_and_empty() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/data_summary"))
            .and(query_param("select", "usage_id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "usage_id": null },
                { "usage_id": "" },
                { "usage_id": "S2" }
            ])))
            .mount(&server)
            .await;

        assert_eq!(store(&server).usage_ids().await.unwrap(), vec!["S2"]);
    }
}
