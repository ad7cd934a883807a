//! Shared domain types for sites, teams and users.
//!
//! These mirror the rows of the operational store and are passed between
//! the scheduler, prober and store adapter without re-fetching from SQL
//! on every field access.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::wire::ProbeSnapshot;

/// Three-state health level produced by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficLight {
    Green,
    Orange,
    Red,
}

impl TrafficLight {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficLight::Green => "green",
            TrafficLight::Orange => "orange",
            TrafficLight::Red => "red",
        }
    }

    pub fn upper(&self) -> &'static str {
        match self {
            TrafficLight::Green => "GREEN",
            TrafficLight::Orange => "ORANGE",
            TrafficLight::Red => "RED",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            TrafficLight::Green => "\u{2705}",
            TrafficLight::Orange => "\u{1F7E0}",
            TrafficLight::Red => "\u{274C}",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "green" => Some(TrafficLight::Green),
            "orange" => Some(TrafficLight::Orange),
            "red" => Some(TrafficLight::Red),
            _ => None,
        }
    }
}

impl std::fmt::Display for TrafficLight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// User-defined flags attached to a site. Recognized keys are typed; anything
/// else the admin API stores is preserved in `extra` so it round-trips.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Com {
    #[serde(default)]
    pub llm: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tg: Option<i64>,
    #[serde(default)]
    pub skip_notification: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A monitored endpoint and the state the prober maintains for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub id: i64,
    pub url: String,
    pub name: String,
    pub ping_interval_sec: i64,
    #[serde(default)]
    pub com: Com,
    pub last_traffic_light: Option<TrafficLight>,
    /// Bounded to the last 10 probes, newest last.
    pub history: Vec<ProbeSnapshot>,
    pub last_ok: Option<bool>,
    pub last_status: Option<i64>,
    pub last_rtt: Option<f64>,
}

impl Site {
    pub const MAX_HISTORY: usize = 10;
    /// Window of prior snapshots the classifier is handed alongside the
    /// current one (`history`'s last 4 entries).
    pub const CLASSIFIER_WINDOW: usize = 4;

    pub fn recent_history(&self) -> &[ProbeSnapshot] {
        let start = self.history.len().saturating_sub(Self::CLASSIFIER_WINDOW);
        &self.history[start..]
    }

    pub fn push_snapshot(&mut self, snapshot: ProbeSnapshot) {
        self.history.push(snapshot);
        if self.history.len() > Self::MAX_HISTORY {
            let overflow = self.history.len() - Self::MAX_HISTORY;
            self.history.drain(0..overflow);
        }
    }
}

/// A recipient group binding sites to chat and email destinations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub tracked_site_ids: HashSet<i64>,
    pub tg_chat_id: Option<i64>,
    pub email_recipients: HashSet<String>,
    #[serde(default)]
    pub webhook_urls: Vec<String>,
}

/// An individual chat subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub tg_user_id: i64,
    pub tg_chat_id: Option<i64>,
    pub login: Option<String>,
    pub enabled: bool,
}
