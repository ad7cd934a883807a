mod antispam;
mod bus;
mod checks;
mod classifier;
mod config;
mod dispatcher;
mod formatters;
mod llm_worker;
mod prober;
mod scheduler;
mod senders;
mod state;

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use tracing_subscriber::EnvFilter;

use antispam::AntiSpam;
use config::Config;
use senders::{chat::ChatSender, email::EmailSender};
use state::AppState;
use store::{AnalyticsStore, OperationalStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = Config::load_or_default();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("starting pingfleet server");

    let operational = Arc::new(OperationalStore::new(std::path::Path::new(&config.database.operational_path))?);
    let analytics = Arc::new(AnalyticsStore::new(std::path::Path::new(&config.database.analytics_path))?);

    let bus = bus::Bus::connect(&config.rabbit).await?;

    let running_probers = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let scheduler_channel = bus.channel().await?;
    let scheduler = scheduler::Scheduler::new(
        operational.clone(),
        analytics.clone(),
        Some(scheduler_channel),
        config.rabbit.clone(),
        config.pinger.clone(),
        running_probers.clone(),
    );
    tokio::spawn(scheduler.run());

    let llm_channel = bus.channel().await?;
    let llm_rabbit_cfg = config.rabbit.clone();
    let llm_cfg = config.llm.clone();
    tokio::spawn(async move {
        if let Err(e) = llm_worker::run(llm_channel, llm_rabbit_cfg, llm_cfg).await {
            tracing::error!(error = %e, "llm worker exited");
        }
    });

    let dispatcher_channel = bus.channel().await?;
    let antispam = Arc::new(AntiSpam::new(config.dispatcher.antispam_window_sec));
    let chat_sender = Arc::new(ChatSender::new(config.telegram.token.clone()));
    let email_sender = Arc::new(EmailSender::new(config.email.clone()));
    let dispatcher_rabbit_cfg = config.rabbit.clone();
    let dispatcher_cfg = config.dispatcher.clone();
    let dispatcher_operational = operational.clone();
    tokio::spawn(async move {
        if let Err(e) = dispatcher::run(
            dispatcher_channel,
            dispatcher_rabbit_cfg,
            dispatcher_cfg,
            dispatcher_operational,
            antispam,
            chat_sender,
            email_sender,
        )
        .await
        {
            tracing::error!(error = %e, "dispatcher exited");
        }
    });

    if config.health.enabled {
        let state = AppState {
            operational,
            analytics,
            running_probers,
            server_start_time: std::time::Instant::now(),
        };
        let app = Router::new().route("/healthz", get(healthz)).with_state(state);
        let addr = format!("0.0.0.0:{}", config.health.port);
        tracing::info!(%addr, "health endpoint listening");
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;
    } else {
        std::future::pending::<()>().await;
    }

    Ok(())
}

async fn healthz(axum::extract::State(state): axum::extract::State<AppState>) -> Json<serde_json::Value> {
    let sites = state.operational.list_sites().await.map(|s| s.len()).unwrap_or(0);
    let running = state.running_probers.load(std::sync::atomic::Ordering::Relaxed);
    let uptime_sec = state.server_start_time.elapsed().as_secs();
    Json(serde_json::json!({
        "status": if running == sites { "ok" } else { "reconciling" },
        "sites": sites,
        "running_probers": running,
        "uptime_sec": uptime_sec,
    }))
}
