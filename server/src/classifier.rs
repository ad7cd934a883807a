//! The hysteresis classifier: maps a current snapshot plus recent history
//! to a traffic light. Deterministic, total, pure.
//!
//! Rule order and the sustained-failure escalation (rules 2 and 5) are
//! grounded on `original_source/pinger/pinger_checks.py`'s
//! `traffic_light_from_history`; the numeric thresholds below are this
//! system's own fixed values, not the original's.

use common::{ProbeSnapshot, TrafficLight};

/// `history` is the site's last `Site::CLASSIFIER_WINDOW` snapshots,
/// oldest first, not including `current`.
pub fn classify(current: &ProbeSnapshot, history: &[ProbeSnapshot]) -> TrafficLight {
    let last5: Vec<&ProbeSnapshot> = history.iter().chain(std::iter::once(current)).collect();

    let http_status = current.http_status;

    // 1. Missing status is fatal.
    let Some(status) = http_status else {
        return TrafficLight::Red;
    };

    // 2. Server errors: escalate to red under sustained failure.
    if status >= 500 {
        let last_two_failed = last5.len() >= 2
            && last5[last5.len() - 2..].iter().all(|s| s.http_status.map(|v| v >= 500).unwrap_or(false));
        let more_than_two_failed = last5.iter().filter(|s| s.http_status.map(|v| v >= 500).unwrap_or(false)).count() > 2;
        return if last_two_failed || more_than_two_failed {
            TrafficLight::Red
        } else {
            TrafficLight::Orange
        };
    }

    // 3. Client errors are always orange.
    if (400..500).contains(&status) {
        return TrafficLight::Orange;
    }

    // 4. Latency.
    match current.latency_ms {
        None => return TrafficLight::Red,
        Some(ms) if ms > 5000 => return TrafficLight::Red,
        Some(ms) if ms > 2500 => return TrafficLight::Red,
        Some(ms) if ms > 1500 => return TrafficLight::Orange,
        _ => {}
    }

    // 5. Ping, with sustained-failure escalation like rule 2.
    if let Some(ping_ms) = current.ping_ms {
        let last_two_slow = last5.len() >= 2
            && last5[last5.len() - 2..].iter().all(|s| s.ping_ms.map(|v| v > 1200.0).unwrap_or(false));
        if last_two_slow || ping_ms > 1500.0 {
            return TrafficLight::Red;
        }
        if ping_ms > 600.0 {
            return TrafficLight::Orange;
        }
    }

    // 6. TLS expiry.
    if let Some(days) = current.ssl_days_left {
        if days <= 0 {
            return TrafficLight::Red;
        }
        if days < 7 {
            return TrafficLight::Orange;
        }
    }

    // 7. DNS.
    if !current.dns_resolved {
        return TrafficLight::Red;
    }

    // 8. Excess redirects.
    if current.redirects.map(|r| r > 5).unwrap_or(false) {
        return TrafficLight::Orange;
    }

    TrafficLight::Green
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(http_status: Option<i64>, latency_ms: Option<i64>, ping_ms: Option<f64>) -> ProbeSnapshot {
        ProbeSnapshot {
            timestamp: "2026-08-01T00:00:00".to_string(),
            traffic_light: TrafficLight::Green,
            http_status,
            latency_ms,
            ping_ms,
            ssl_days_left: Some(365),
            dns_resolved: true,
            redirects: Some(0),
            errors_last: Some(0),
        }
    }

    #[test]
    fn missing_status_is_red() {
        let current = snap(None, Some(100), Some(10.0));
        assert_eq!(classify(&current, &[]), TrafficLight::Red);
    }

    #[test]
    fn single_500_without_history_is_orange() {
        let current = snap(Some(500), Some(100), Some(10.0));
        assert_eq!(classify(&current, &[]), TrafficLight::Orange);
    }

    #[test]
    fn two_consecutive_500s_escalate_to_red() {
        let prev = snap(Some(503), Some(100), Some(10.0));
        let current = snap(Some(503), Some(100), Some(10.0));
        assert_eq!(classify(&current, &[prev]), TrafficLight::Red);
    }

    #[test]
    fn client_error_is_orange() {
        let current = snap(Some(404), Some(100), Some(10.0));
        assert_eq!(classify(&current, &[]), TrafficLight::Orange);
    }

    #[test]
    fn latency_boundaries() {
        assert_eq!(classify(&snap(Some(200), Some(1500), Some(10.0)), &[]), TrafficLight::Green);
        assert_eq!(classify(&snap(Some(200), Some(1501), Some(10.0)), &[]), TrafficLight::Orange);
        assert_eq!(classify(&snap(Some(200), Some(2501), Some(10.0)), &[]), TrafficLight::Red);
    }

    #[test]
    fn ping_boundaries() {
        assert_eq!(classify(&snap(Some(200), Some(100), Some(600.0)), &[]), TrafficLight::Green);
        assert_eq!(classify(&snap(Some(200), Some(100), Some(601.0)), &[]), TrafficLight::Orange);
        assert_eq!(classify(&snap(Some(200), Some(100), Some(1501.0)), &[]), TrafficLight::Red);
    }

    #[test]
    fn ssl_boundary_is_green_at_seven_days() {
        let mut current = snap(Some(200), Some(100), Some(10.0));
        current.ssl_days_left = Some(7);
        assert_eq!(classify(&current, &[]), TrafficLight::Green);
        current.ssl_days_left = Some(6);
        assert_eq!(classify(&current, &[]), TrafficLight::Orange);
        current.ssl_days_left = Some(0);
        assert_eq!(classify(&current, &[]), TrafficLight::Red);
    }

    #[test]
    fn dns_failure_is_red() {
        let mut current = snap(Some(200), Some(100), Some(10.0));
        current.dns_resolved = false;
        assert_eq!(classify(&current, &[]), TrafficLight::Red);
    }

    #[test]
    fn excess_redirects_is_orange() {
        let mut current = snap(Some(200), Some(100), Some(10.0));
        current.redirects = Some(6);
        assert_eq!(classify(&current, &[]), TrafficLight::Orange);
        current.redirects = Some(5);
        assert_eq!(classify(&current, &[]), TrafficLight::Green);
    }

    #[test]
    fn steady_green_stays_green() {
        let history: Vec<ProbeSnapshot> = (0..4).map(|_| snap(Some(200), Some(100), Some(20.0))).collect();
        let current = snap(Some(200), Some(100), Some(20.0));
        assert_eq!(classify(&current, &history), TrafficLight::Green);
    }
}
