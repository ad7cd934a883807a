//! Analytics store: the append-only probe log used for history charts and
//! the archiver's rolling cleanup.
//!
//! Grounded on `original_source/clickhouse/clickhouse.py`: `insert_log` and
//! `fetch_old_logs` become `insert_row` and `fetch_rows_older_than` here,
//! backed by SQLite instead of ClickHouse since no ClickHouse driver is
//! available anywhere in the example pack (see DESIGN.md).

use std::path::Path;

use common::{AnalyticsRow, TrafficLight};
use rusqlite::{params, Row};

use crate::{schema::ANALYTICS_SCHEMA, DbConnection};

pub struct AnalyticsStore {
    db: DbConnection,
}

impl AnalyticsStore {
    pub fn new(db_path: &Path) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Self {
            db: crate::open(db_path, ANALYTICS_SCHEMA)?,
        })
    }

    fn row_to_analytics(row: &Row) -> rusqlite::Result<AnalyticsRow> {
        let tl: String = row.get("traffic_light")?;
        Ok(AnalyticsRow {
            site_id: row.get("site_id")?,
            url: row.get("url")?,
            name: row.get("name")?,
            timestamp: row.get("timestamp")?,
            traffic_light: TrafficLight::from_str_loose(&tl).unwrap_or(TrafficLight::Red),
            http_status: row.get("http_status")?,
            latency_ms: row.get("latency_ms")?,
            ping_ms: row.get("ping_ms")?,
            ssl_days_left: row.get("ssl_days_left")?,
            dns_resolved: row.get::<_, i64>("dns_resolved")? != 0,
            redirects: row.get("redirects")?,
            errors_last: row.get("errors_last")?,
            ping_interval_sec: row.get("ping_interval")?,
        })
    }

    pub async fn insert_row(&self, row: &AnalyticsRow) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO site_logs (
                site_id, url, name, timestamp, traffic_light, http_status, latency_ms,
                ping_ms, ssl_days_left, dns_resolved, redirects, errors_last, ping_interval
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                row.site_id,
                row.url,
                row.name,
                row.timestamp,
                row.traffic_light.as_str(),
                row.http_status,
                row.latency_ms,
                row.ping_ms,
                row.ssl_days_left,
                row.dns_resolved as i64,
                row.redirects,
                row.errors_last,
                row.ping_interval_sec,
            ],
        )?;
        Ok(())
    }

    pub async fn recent_rows_for_site(
        &self,
        site_id: i64,
        limit: i64,
    ) -> Result<Vec<AnalyticsRow>, Box<dyn std::error::Error + Send + Sync>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT * FROM site_logs WHERE site_id = ? ORDER BY timestamp DESC LIMIT ?",
        )?;
        let rows = stmt
            .query_map(params![site_id, limit], Self::row_to_analytics)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Rows older than `cutoff_rfc3339`, oldest first. Used by the archiver
    /// to page through what it is about to delete.
    pub async fn fetch_rows_older_than(
        &self,
        cutoff_rfc3339: &str,
        limit: i64,
    ) -> Result<Vec<AnalyticsRow>, Box<dyn std::error::Error + Send + Sync>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT * FROM site_logs WHERE timestamp < ? ORDER BY timestamp ASC LIMIT ?",
        )?;
        let rows = stmt
            .query_map(params![cutoff_rfc3339, limit], Self::row_to_analytics)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub async fn delete_rows_older_than(
        &self,
        cutoff_rfc3339: &str,
    ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        let db = self.db.lock().await;
        let deleted = db.execute("DELETE FROM site_logs WHERE timestamp < ?", params![cutoff_rfc3339])?;
        Ok(deleted)
    }

    pub async fn count_rows(&self) -> Result<i64, Box<dyn std::error::Error + Send + Sync>> {
        let db = self.db.lock().await;
        let count: i64 = db.query_row("SELECT COUNT(*) FROM site_logs", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn row(site_id: i64, timestamp: &str, tl: TrafficLight) -> AnalyticsRow {
        AnalyticsRow {
            site_id,
            url: "https://example.com".to_string(),
            name: "Example".to_string(),
            timestamp: timestamp.to_string(),
            traffic_light: tl,
            http_status: Some(200),
            latency_ms: Some(80),
            ping_ms: Some(12.5),
            ssl_days_left: Some(60),
            dns_resolved: true,
            redirects: Some(0),
            errors_last: Some(0),
            ping_interval_sec: 30,
        }
    }

    async fn store() -> AnalyticsStore {
        let temp_file = NamedTempFile::new().unwrap();
        AnalyticsStore::new(temp_file.path()).unwrap()
    }

    #[tokio::test]
    async fn insert_and_count() {
        let store = store().await;
        store.insert_row(&row(1, "2026-01-01T00:00:00", TrafficLight::Green)).await.unwrap();
        store.insert_row(&row(1, "2026-01-02T00:00:00", TrafficLight::Red)).await.unwrap();
        assert_eq!(store.count_rows().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn recent_rows_are_newest_first() {
        let store = store().await;
        store.insert_row(&row(1, "2026-01-01T00:00:00", TrafficLight::Green)).await.unwrap();
        store.insert_row(&row(1, "2026-01-02T00:00:00", TrafficLight::Red)).await.unwrap();
        let rows = store.recent_rows_for_site(1, 10).await.unwrap();
        assert_eq!(rows[0].timestamp, "2026-01-02T00:00:00");
    }

    #[tokio::test]
    async fn archiver_deletes_only_old_rows() {
        let store = store().await;
        store.insert_row(&row(1, "2026-01-01T00:00:00", TrafficLight::Green)).await.unwrap();
        store.insert_row(&row(1, "2026-06-01T00:00:00", TrafficLight::Green)).await.unwrap();

        let old = store.fetch_rows_older_than("2026-03-01T00:00:00", 100).await.unwrap();
        assert_eq!(old.len(), 1);

        let deleted = store.delete_rows_older_than("2026-03-01T00:00:00").await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.count_rows().await.unwrap(), 1);
    }
}
