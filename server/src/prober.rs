//! Per-site prober loop. Grounded on
//! `original_source/pinger/pinger_loop.py`: read history, probe, classify,
//! persist, publish, sleep, repeat until cancelled.

use std::sync::Arc;
use std::time::Duration;

use common::{AnalyticsRow, ProbeEvent, Site};
use lapin::Channel;
use store::{AnalyticsStore, OperationalStore};
use tokio::sync::Notify;

use crate::config::{PingerConfig, RabbitConfig};

/// Runs the probe cycle for one site until `stop` is notified. Each cycle:
/// probe, classify, detect-change, persist atomically, append analytics
/// row, publish unless suppressed, sleep for the site's interval.
pub async fn run(
    site_id: i64,
    operational: Arc<OperationalStore>,
    analytics: Arc<AnalyticsStore>,
    bus_channel: Option<Channel>,
    rabbit_cfg: RabbitConfig,
    pinger_cfg: PingerConfig,
    stop: Arc<Notify>,
) {
    loop {
        let Some(site) = operational.get_site_by_id(site_id).await.ok().flatten() else {
            tracing::warn!(site_id, "prober: site vanished, stopping");
            return;
        };

        if let Err(e) = run_cycle(&site, &operational, &analytics, bus_channel.as_ref(), &rabbit_cfg, &pinger_cfg).await
        {
            tracing::warn!(site_id, error = %e, "prober cycle failed, continuing");
        }

        let interval = Duration::from_secs(site.ping_interval_sec.max(1) as u64);
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = stop.notified() => {
                tracing::info!(site_id, "prober: stop signal received, exiting");
                return;
            }
        }
    }
}

async fn run_cycle(
    site: &Site,
    operational: &OperationalStore,
    analytics: &AnalyticsStore,
    bus_channel: Option<&Channel>,
    rabbit_cfg: &RabbitConfig,
    pinger_cfg: &PingerConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let history = site.recent_history().to_vec();
    let outcome = crate::checks::probe(&site.url, &history).await;
    let snapshot = outcome.snapshot;

    tracing::debug!(
        site_id = site.id,
        traffic_light = ?snapshot.traffic_light,
        http_status = ?snapshot.http_status,
        latency_ms = ?snapshot.latency_ms,
        dns_resolved = snapshot.dns_resolved,
        "probe outcome"
    );
    if Some(snapshot.traffic_light) != site.last_traffic_light {
        tracing::info!(
            site_id = site.id,
            from = ?site.last_traffic_light,
            to = ?snapshot.traffic_light,
            "traffic light changed"
        );
    }

    let ok = snapshot.traffic_light == common::TrafficLight::Green;
    let unchanged = site.last_ok == Some(ok)
        && site.last_status == snapshot.http_status
        && site.last_rtt == snapshot.latency_ms.map(|v| v as f64);

    let mut com = site.com.clone();
    com.skip_notification = unchanged && !pinger_cfg.notify_always;

    let mut updated = site.clone();
    updated.push_snapshot(snapshot.clone());

    operational
        .update_after_probe(
            site.id,
            &com,
            snapshot.traffic_light,
            &updated.history,
            ok,
            snapshot.http_status,
            snapshot.latency_ms.map(|v| v as f64),
        )
        .await?;

    let row = AnalyticsRow::from_snapshot(site.id, site.url.clone(), site.name.clone(), site.ping_interval_sec, &snapshot);
    analytics.insert_row(&row).await?;

    if !com.skip_notification {
        if let Some(chan) = bus_channel {
            let event = ProbeEvent {
                id: site.id,
                url: site.url.clone(),
                name: site.name.clone(),
                com,
                logs: snapshot,
                explanation: None,
            };
            if let Err(e) = crate::bus::publish(chan, &rabbit_cfg.pinger_exchange, &rabbit_cfg.pinger_routing_key, &event).await
            {
                tracing::warn!(site_id = site.id, error = %e, "failed to publish probe event, next cycle will supersede it");
            }
        }
    }

    Ok(())
}
