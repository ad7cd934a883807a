//! Anti-spam suppression service: a process-local, mutex-guarded map from
//! (site_id, incident_key) to the last time a notification was sent.
//!
//! Structural port of
//! `original_source/notifier-service/dispatcher/services/antispam.py`'s
//! `AntiSpamService` onto `tokio::sync::Mutex` and `Instant`.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub struct AntiSpam {
    ttl: Duration,
    entries: Mutex<HashMap<(i64, String), Instant>>,
}

impl AntiSpam {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_seconds),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// True when a notification for this fingerprint is outside the
    /// suppression window (or the window is disabled).
    pub async fn should_send(&self, site_id: i64, incident_key: &str) -> bool {
        if self.ttl.is_zero() {
            return true;
        }
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        cleanup(&mut entries, now, self.ttl);
        let key = (site_id, incident_key.to_string());
        match entries.get(&key) {
            Some(last) if now.duration_since(*last) < self.ttl => {
                tracing::info!(site_id, incident_key, "notification suppressed by anti-spam window");
                false
            }
            _ => true,
        }
    }

    pub async fn mark_sent(&self, site_id: i64, incident_key: &str) {
        if self.ttl.is_zero() {
            return;
        }
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.insert((site_id, incident_key.to_string()), now);
        cleanup(&mut entries, now, self.ttl);
    }
}

fn cleanup(entries: &mut HashMap<(i64, String), Instant>, now: Instant, ttl: Duration) {
    entries.retain(|_, ts| now.duration_since(*ts) < ttl);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_send_for_a_fingerprint_is_allowed() {
        let antispam = AntiSpam::new(60);
        assert!(antispam.should_send(1, "RED|-|-").await);
    }

    #[tokio::test]
    async fn repeat_within_window_is_suppressed() {
        let antispam = AntiSpam::new(60);
        antispam.mark_sent(1, "RED|-|-").await;
        assert!(!antispam.should_send(1, "RED|-|-").await);
    }

    #[tokio::test]
    async fn different_fingerprint_bypasses_suppression() {
        let antispam = AntiSpam::new(60);
        antispam.mark_sent(1, "RED|-|-").await;
        assert!(antispam.should_send(1, "ORANGE|503|-").await);
    }

    #[tokio::test]
    async fn zero_window_always_sends() {
        let antispam = AntiSpam::new(0);
        antispam.mark_sent(1, "RED|-|-").await;
        assert!(antispam.should_send(1, "RED|-|-").await);
    }
}
