//! Wire types: the JSON payload published on the message bus and the
//! analytics row derived from it. Field names match the bus schema exactly
//! so `serde_json` round-trips without renames.

use serde::{Deserialize, Serialize};

use crate::model::{Com, TrafficLight};

/// One probe's worth of numeric measurements plus the classifier's verdict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeSnapshot {
    pub timestamp: String,
    pub traffic_light: TrafficLight,
    pub http_status: Option<i64>,
    pub latency_ms: Option<i64>,
    pub ping_ms: Option<f64>,
    pub ssl_days_left: Option<i64>,
    pub dns_resolved: bool,
    pub redirects: Option<i64>,
    pub errors_last: Option<i64>,
}

/// The bus payload shared by the pinger, LLM worker and dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeEvent {
    pub id: i64,
    pub url: String,
    pub name: String,
    #[serde(default)]
    pub com: Com,
    pub logs: ProbeSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl ProbeEvent {
    /// `TRAFFIC_LIGHT|http_status|errors_last`, the suppression key used by
    /// the anti-spam service. A color transition or error-taxonomy change
    /// always produces a new key, bypassing suppression immediately.
    pub fn incident_key(&self) -> String {
        let status = self
            .logs
            .http_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let errors = self
            .logs
            .errors_last
            .map(|e| e.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!("{}|{}|{}", self.logs.traffic_light.upper(), status, errors)
    }
}

/// An append-only analytics row, one per probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsRow {
    pub site_id: i64,
    pub url: String,
    pub name: String,
    pub timestamp: String,
    pub traffic_light: TrafficLight,
    pub http_status: Option<i64>,
    pub latency_ms: Option<i64>,
    pub ping_ms: Option<f64>,
    pub ssl_days_left: Option<i64>,
    pub dns_resolved: bool,
    pub redirects: Option<i64>,
    pub errors_last: Option<i64>,
    pub ping_interval_sec: i64,
}

impl AnalyticsRow {
    pub fn from_snapshot(site_id: i64, url: String, name: String, ping_interval_sec: i64, snap: &ProbeSnapshot) -> Self {
        Self {
            site_id,
            url,
            name,
            timestamp: snap.timestamp.clone(),
            traffic_light: snap.traffic_light,
            http_status: snap.http_status,
            latency_ms: snap.latency_ms,
            ping_ms: snap.ping_ms,
            ssl_days_left: snap.ssl_days_left,
            dns_resolved: snap.dns_resolved,
            redirects: snap.redirects,
            errors_last: snap.errors_last,
            ping_interval_sec,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(status: Option<i64>, errors: Option<i64>, tl: TrafficLight) -> ProbeSnapshot {
        ProbeSnapshot {
            timestamp: "2026-08-01T00:00:00".to_string(),
            traffic_light: tl,
            http_status: status,
            latency_ms: None,
            ping_ms: None,
            ssl_days_left: None,
            dns_resolved: true,
            redirects: None,
            errors_last: errors,
        }
    }

    fn event(status: Option<i64>, errors: Option<i64>, tl: TrafficLight) -> ProbeEvent {
        ProbeEvent {
            id: 1,
            url: "https://example.com".to_string(),
            name: "Example".to_string(),
            com: Com::default(),
            logs: snapshot(status, errors, tl),
            explanation: None,
        }
    }

    #[test]
    fn incident_key_uses_dash_for_missing_fields() {
        let e = event(None, None, TrafficLight::Red);
        assert_eq!(e.incident_key(), "RED|-|-");
    }

    #[test]
    fn incident_key_changes_with_status() {
        let a = event(Some(500), None, TrafficLight::Orange);
        let b = event(Some(503), None, TrafficLight::Orange);
        assert_ne!(a.incident_key(), b.incident_key());
    }

    #[test]
    fn probe_event_round_trips_through_json() {
        let e = event(Some(200), Some(0), TrafficLight::Green);
        let json = serde_json::to_string(&e).unwrap();
        let back: ProbeEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, e.id);
        assert_eq!(back.logs, e.logs);
        assert_eq!(back.incident_key(), e.incident_key());
    }
}
