//! SQLite-backed summary table

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use rusqlite::{params, Connection};

use crate::error::{Result, SummaryError};
use crate::models::{AggregateRow, SummaryQuery};
use crate::storage::{SummaryStore, DEFAULT_CHUNK_SIZE};

/// Local `data_summary` table
pub struct SqliteSummaryStore {
    conn: Mutex<Connection>,
    label: String,
}

impl SqliteSummaryStore {
    /// Open or create the summary database
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| SummaryError::Database(format!("Failed to open summary database: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
            label: path.display().to_string(),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SummaryError::Database(format!("Failed to open in-memory database: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
            label: ":memory:".to_string(),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run migrations
    fn migrate(&self) -> Result<()> {
        self.conn()
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS data_summary (
                    usage_id TEXT NOT NULL,
                    date TEXT NOT NULL,
                    calories_total INTEGER NOT NULL,
                    steps_total INTEGER NOT NULL,
                    rhr REAL NOT NULL,
                    br_sleep REAL NOT NULL,
                    hrv_sleep REAL NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                    PRIMARY KEY (usage_id, date)
                );
                "#,
            )
            .map_err(|e| SummaryError::Database(format!("Failed to run migrations: {}", e)))?;

        Ok(())
    }

    /// Total number of stored rows
    pub fn count(&self) -> Result<u32> {
        self.conn()
            .query_row("SELECT COUNT(*) FROM data_summary", [], |row| row.get(0))
            .map_err(|e| SummaryError::Database(format!("Failed to count rows: {}", e)))
    }

    fn upsert_chunk(conn: &mut Connection, rows: &[AggregateRow]) -> Result<()> {
        let tx = conn
            .transaction()
            .map_err(|e| SummaryError::Database(format!("Failed to start transaction: {}", e)))?;

        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO data_summary
                        (usage_id, date, calories_total, steps_total, rhr, br_sleep, hrv_sleep)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(usage_id, date) DO UPDATE SET
                        calories_total = excluded.calories_total,
                        steps_total = excluded.steps_total,
                        rhr = excluded.rhr,
                        br_sleep = excluded.br_sleep,
                        hrv_sleep = excluded.hrv_sleep,
                        updated_at = datetime('now')",
                )
                .map_err(|e| SummaryError::Database(format!("Failed to prepare upsert: {}", e)))?;

            for row in rows {
                stmt.execute(params![
                    row.usage_id,
                    row.date,
                    row.calories_total,
                    row.steps_total,
                    row.rhr,
                    row.br_sleep,
                    row.hrv_sleep,
                ])
                .map_err(|e| {
                    SummaryError::Database(format!("Failed to upsert {} {}: {}", row.usage_id, row.date, e))
                })?;
            }
        }

        tx.commit()
            .map_err(|e| SummaryError::Database(format!("Failed to commit upsert: {}", e)))
    }
}

#[async_trait]
impl SummaryStore for SqliteSummaryStore {
    fn describe(&self) -> String {
        format!("sqlite:{}", self.label)
    }

    async fn upsert_all(&self, rows: &[AggregateRow]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn();
        for chunk in rows.chunks(DEFAULT_CHUNK_SIZE) {
            Self::upsert_chunk(&mut conn, chunk)?;
        }
        Ok(rows.len())
    }

    async fn usage_ids(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT DISTINCT usage_id FROM data_summary ORDER BY usage_id")
            .map_err(|e| SummaryError::Database(format!("Failed to prepare query: {}", e)))?;

        let ids = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| SummaryError::Database(format!("Failed to list usage ids: {}", e)))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    async fn fetch_rows(&self, query: &SummaryQuery) -> Result<Vec<AggregateRow>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT usage_id, date, calories_total, steps_total, rhr, br_sleep, hrv_sleep
                 FROM data_summary
                 WHERE usage_id = ?1
                   AND (?2 IS NULL OR date >= ?2)
                   AND (?3 IS NULL OR date <= ?3)
                 ORDER BY date ASC",
            )
            .map_err(|e| SummaryError::Database(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![query.usage_id, query.from, query.to], |row| {
                Ok(AggregateRow {
                    usage_id: row.get(0)?,
                    date: row.get(1)?,
                    calories_total: row.get(2)?,
                    steps_total: row.get(3)?,
                    rhr: row.get(4)?,
                    br_sleep: row.get(5)?,
                    hrv_sleep: row.get(6)?,
                })
            })
            .map_err(|e| SummaryError::Database(format!("Failed to fetch rows: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(usage_id: &str, day: u32, steps: i64) -> AggregateRow {
        AggregateRow {
            usage_id: usage_id.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 8, day).unwrap(),
            calories_total: 2000,
            steps_total: steps,
            rhr: 58.0,
            br_sleep: 16.2,
            hrv_sleep: 42.0,
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let db = SqliteSummaryStore::open_in_memory().unwrap();
        let rows = vec![row("S1", 9, 9000), row("S1", 10, 7000)];

        assert_eq!(db.upsert_all(&rows).await.unwrap(), 2);
        assert_eq!(db.upsert_all(&rows).await.unwrap(), 2);
        assert_eq!(db.count().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_upsert_replaces_whole_row() {
        let db = SqliteSummaryStore::open_in_memory().unwrap();
        db.upsert_all(&[row("S1", 9, 9000)]).await.unwrap();

        let mut updated = row("S1", 9, 12000);
        updated.hrv_sleep = 50.5;
        db.upsert_all(&[updated.clone()]).await.unwrap();

        let rows = db.fetch_rows(&SummaryQuery::for_usage("S1")).await.unwrap();
        assert_eq!(rows, vec![updated]);
    }

    #[tokio::test]
    async fn test_empty_upsert_writes_nothing() {
        let db = SqliteSummaryStore::open_in_memory().unwrap();
        assert_eq!(db.upsert_all(&[]).await.unwrap(), 0);
        assert_eq!(db.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fetch_rows_range_and_order() {
        let db = SqliteSummaryStore::open_in_memory().unwrap();
        db.upsert_all(&[
            row("S1", 12, 1),
            row("S1", 9, 2),
            row("S1", 10, 3),
            row("S2", 10, 4),
        ])
        .await
        .unwrap();

        let all = db.fetch_rows(&SummaryQuery::for_usage("S1")).await.unwrap();
        let days: Vec<_> = all.iter().map(|r| r.date.to_string()).collect();
        assert_eq!(days, vec!["2024-08-09", "2024-08-10", "2024-08-12"]);

        let query = SummaryQuery::for_usage("S1").between(
            NaiveDate::from_ymd_opt(2024, 8, 10),
            NaiveDate::from_ymd_opt(2024, 8, 12),
        );
        let ranged = db.fetch_rows(&query).await.unwrap();
        assert_eq!(ranged.len(), 2);
        assert!(ranged.iter().all(|r| query.contains(r.date)));

        let upper_only = SummaryQuery::for_usage("S1").between(None, NaiveDate::from_ymd_opt(2024, 8, 9));
        assert_eq!(db.fetch_rows(&upper_only).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_usage_ids_sorted_distinct() {
        let db = SqliteSummaryStore::open_in_memory().unwrap();
        db.upsert_all(&[row("S2", 9, 1), row("S1", 9, 1), row("S2", 10, 1)])
            .await
            .unwrap();
        assert_eq!(db.usage_ids().await.unwrap(), vec!["S1", "S2"]);
    }

    #[tokio::test]
    async fn test_reopen_file_keeps_rows() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("summary.db");

        let db = SqliteSummaryStore::open(&path).unwrap();
        db.upsert_all(&[row("S1", 9, 9000)]).await.unwrap();
        drop(db);

        let db = SqliteSummaryStore::open(&path).unwrap();
        assert_eq!(db.count().unwrap(), 1);
        assert!(db.describe().ends_with("summary.db"));
    }
}
