//! Operational store: sites, teams and chat subscribers.
//!
//! Site history and flags are kept as JSON text columns rather than a
//! normalized child table, mirroring how `original_source/database/database.py`
//! stores `Site.history` and `Site.com` as JSON blobs next to the scalar
//! columns.

use std::collections::HashSet;
use std::path::Path;

use common::{Com, ProbeSnapshot, Site, Team, TrafficLight, User};
use rusqlite::{params, OptionalExtension, Row};

use crate::{schema::OPERATIONAL_SCHEMA, DbConnection};

pub struct OperationalStore {
    db: DbConnection,
}

impl OperationalStore {
    pub fn new(db_path: &Path) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Self {
            db: crate::open(db_path, OPERATIONAL_SCHEMA)?,
        })
    }

    fn row_to_site(row: &Row) -> rusqlite::Result<Site> {
        let com_json: String = row.get("com")?;
        let history_json: String = row.get("history")?;
        let tl: Option<String> = row.get("last_traffic_light")?;
        Ok(Site {
            id: row.get("id")?,
            url: row.get("url")?,
            name: row.get("name")?,
            ping_interval_sec: row.get("ping_interval")?,
            com: serde_json::from_str(&com_json).unwrap_or_default(),
            last_traffic_light: tl.as_deref().and_then(TrafficLight::from_str_loose),
            history: serde_json::from_str(&history_json).unwrap_or_default(),
            last_ok: row.get::<_, Option<i64>>("last_ok")?.map(|v| v != 0),
            last_status: row.get("last_status")?,
            last_rtt: row.get("last_rtt")?,
        })
    }

    pub async fn list_sites(&self) -> Result<Vec<Site>, Box<dyn std::error::Error + Send + Sync>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare("SELECT * FROM sites ORDER BY id")?;
        let sites = stmt
            .query_map([], Self::row_to_site)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sites)
    }

    pub async fn get_site_by_id(&self, id: i64) -> Result<Option<Site>, Box<dyn std::error::Error + Send + Sync>> {
        let db = self.db.lock().await;
        let site = db
            .query_row("SELECT * FROM sites WHERE id = ?", params![id], Self::row_to_site)
            .optional()?;
        Ok(site)
    }

    pub async fn get_site_by_url(&self, url: &str) -> Result<Option<Site>, Box<dyn std::error::Error + Send + Sync>> {
        let db = self.db.lock().await;
        let site = db
            .query_row("SELECT * FROM sites WHERE url = ?", params![url], Self::row_to_site)
            .optional()?;
        Ok(site)
    }

    /// Returns the existing row for `url` if present, otherwise inserts a
    /// fresh one with empty history and no prior classification.
    pub async fn ensure_site(
        &self,
        url: &str,
        name: &str,
        ping_interval_sec: i64,
    ) -> Result<Site, Box<dyn std::error::Error + Send + Sync>> {
        if let Some(site) = self.get_site_by_url(url).await? {
            return Ok(site);
        }
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO sites (url, name, ping_interval, com, history) VALUES (?, ?, ?, '{}', '[]')",
            params![url, name, ping_interval_sec],
        )?;
        let id = db.last_insert_rowid();
        drop(db);
        self.get_site_by_id(id)
            .await?
            .ok_or_else(|| "inserted site vanished".into())
    }

    /// Persists the classifier's verdict, the bounded history and the
    /// last-probe scalars for a site in a single transaction.
    pub async fn update_after_probe(
        &self,
        site_id: i64,
        com: &Com,
        last_traffic_light: TrafficLight,
        history: &[ProbeSnapshot],
        last_ok: bool,
        last_status: Option<i64>,
        last_rtt: Option<f64>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let com_json = serde_json::to_string(com)?;
        let history_json = serde_json::to_string(history)?;
        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        tx.execute(
            "UPDATE sites SET com = ?, last_traffic_light = ?, history = ?, last_ok = ?, last_status = ?, last_rtt = ? WHERE id = ?",
            params![
                com_json,
                last_traffic_light.as_str(),
                history_json,
                last_ok as i64,
                last_status,
                last_rtt,
                site_id,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn row_to_team(row: &Row) -> rusqlite::Result<Team> {
        let tracked_json: String = row.get("tracked_site_ids")?;
        let emails_json: String = row.get("email_recipients")?;
        let webhooks_json: String = row.get("webhook_urls")?;
        Ok(Team {
            id: row.get("id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            tracked_site_ids: serde_json::from_str::<HashSet<i64>>(&tracked_json).unwrap_or_default(),
            tg_chat_id: row.get("tg_chat_id")?,
            email_recipients: serde_json::from_str::<HashSet<String>>(&emails_json).unwrap_or_default(),
            webhook_urls: serde_json::from_str(&webhooks_json).unwrap_or_default(),
        })
    }

    /// Teams whose `tracked_site_ids` includes `site_id`. SQLite has no JSON
    /// containment operator without the json1 extension tables wired up, so
    /// filtering happens after the fetch; the teams table is small.
    pub async fn list_teams_tracking(&self, site_id: i64) -> Result<Vec<Team>, Box<dyn std::error::Error + Send + Sync>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare("SELECT * FROM teams")?;
        let teams = stmt
            .query_map([], Self::row_to_team)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(teams
            .into_iter()
            .filter(|t| t.tracked_site_ids.contains(&site_id))
            .collect())
    }

    pub async fn get_team_tg_chats_for_site(
        &self,
        site_id: i64,
    ) -> Result<Vec<i64>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self
            .list_teams_tracking(site_id)
            .await?
            .into_iter()
            .filter_map(|t| t.tg_chat_id)
            .collect())
    }

    pub async fn upsert_user_tg_chat(
        &self,
        tg_user_id: i64,
        tg_chat_id: i64,
        login: Option<&str>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let db = self.db.lock().await;
        let now = chrono::Utc::now().timestamp();
        db.execute(
            "INSERT INTO users (tg_user_id, tg_chat_id, login, enabled, created_at, updated_at)
             VALUES (?, ?, ?, 1, ?, ?)
             ON CONFLICT(tg_user_id) DO UPDATE SET
                tg_chat_id = excluded.tg_chat_id,
                login = excluded.login,
                enabled = 1,
                updated_at = excluded.updated_at",
            params![tg_user_id, tg_chat_id, login, now, now],
        )?;
        Ok(())
    }

    pub async fn disable_user_tg(&self, tg_user_id: i64) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let db = self.db.lock().await;
        let now = chrono::Utc::now().timestamp();
        db.execute(
            "UPDATE users SET enabled = 0, updated_at = ? WHERE tg_user_id = ?",
            params![now, tg_user_id],
        )?;
        Ok(())
    }

    pub async fn get_user_by_tg_id(&self, tg_user_id: i64) -> Result<Option<User>, Box<dyn std::error::Error + Send + Sync>> {
        let db = self.db.lock().await;
        let user = db
            .query_row(
                "SELECT * FROM users WHERE tg_user_id = ?",
                params![tg_user_id],
                |row| {
                    Ok(User {
                        id: row.get("id")?,
                        tg_user_id: row.get("tg_user_id")?,
                        tg_chat_id: row.get("tg_chat_id")?,
                        login: row.get("login")?,
                        enabled: row.get::<_, i64>("enabled")? != 0,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    #[cfg(test)]
    pub async fn create_team(
        &self,
        name: &str,
        tracked_site_ids: &HashSet<i64>,
        tg_chat_id: Option<i64>,
    ) -> Result<i64, Box<dyn std::error::Error + Send + Sync>> {
        let db = self.db.lock().await;
        let now = chrono::Utc::now().timestamp();
        db.execute(
            "INSERT INTO teams (name, tracked_site_ids, tg_chat_id, created_at) VALUES (?, ?, ?, ?)",
            params![name, serde_json::to_string(tracked_site_ids)?, tg_chat_id, now],
        )?;
        Ok(db.last_insert_rowid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    async fn store() -> OperationalStore {
        let temp_file = NamedTempFile::new().unwrap();
        OperationalStore::new(temp_file.path()).unwrap()
    }

    #[tokio::test]
    async fn ensure_site_is_idempotent() {
        let store = store().await;
        let a = store.ensure_site("https://example.com", "Example", 30).await.unwrap();
        let b = store.ensure_site("https://example.com", "Example", 30).await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.ping_interval_sec, 30);
    }

    #[tokio::test]
    async fn update_after_probe_persists_history_and_flags() {
        let store = store().await;
        let site = store.ensure_site("https://example.com", "Example", 30).await.unwrap();
        let snap = ProbeSnapshot {
            timestamp: "2026-08-01T00:00:00".to_string(),
            traffic_light: TrafficLight::Orange,
            http_status: Some(500),
            latency_ms: Some(120),
            ping_ms: None,
            ssl_days_left: Some(40),
            dns_resolved: true,
            redirects: None,
            errors_last: Some(1),
        };
        let com = Com { llm: true, ..Default::default() };
        store
            .update_after_probe(site.id, &com, TrafficLight::Orange, &[snap.clone()], false, Some(500), None)
            .await
            .unwrap();

        let reloaded = store.get_site_by_id(site.id).await.unwrap().unwrap();
        assert_eq!(reloaded.last_traffic_light, Some(TrafficLight::Orange));
        assert_eq!(reloaded.history.len(), 1);
        assert!(reloaded.com.llm);
        assert_eq!(reloaded.last_ok, Some(false));
    }

    #[tokio::test]
    async fn list_teams_tracking_filters_by_site() {
        let store = store().await;
        let site = store.ensure_site("https://example.com", "Example", 30).await.unwrap();
        let other = store.ensure_site("https://other.com", "Other", 30).await.unwrap();
        store.create_team("oncall", &HashSet::from([site.id]), Some(42)).await.unwrap();
        store.create_team("unrelated", &HashSet::from([other.id]), None).await.unwrap();

        let teams = store.list_teams_tracking(site.id).await.unwrap();
        assert_eq!(teams.len(), 1);
        assert_eq!(teams[0].name, "oncall");

        let chats = store.get_team_tg_chats_for_site(site.id).await.unwrap();
        assert_eq!(chats, vec![42]);
    }

    #[tokio::test]
    async fn upsert_and_disable_user_tg() {
        let store = store().await;
        store.upsert_user_tg_chat(7, 777, Some("alice")).await.unwrap();
        let user = store.get_user_by_tg_id(7).await.unwrap().unwrap();
        assert!(user.enabled);
        assert_eq!(user.tg_chat_id, Some(777));

        store.disable_user_tg(7).await.unwrap();
        let user = store.get_user_by_tg_id(7).await.unwrap().unwrap();
        assert!(!user.enabled);
    }
}
