//! LLM enrichment worker: consumes probe events, optionally asks a model
//! for a short explanation, and republishes to `llm.events`.
//!
//! Grounded on `original_source/LLM_service/worker.py` and
//! `openai_wrapper.py`'s thin chat-completions wrapper, adapted onto the
//! bus consumer in [`crate::bus`] instead of a dedicated request/response
//! queue pair.

use std::time::Duration;

use common::ProbeEvent;
use lapin::Channel;
use serde::{Deserialize, Serialize};

use crate::config::{LlmConfig, RabbitConfig};

const LLM_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn run(
    chan: Channel,
    rabbit_cfg: RabbitConfig,
    llm_cfg: LlmConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let client = reqwest::Client::new();
    crate::bus::consume(&chan, &rabbit_cfg.pinger_to_llm_queue, "llm-worker", |event| {
        let client = client.clone();
        let llm_cfg = llm_cfg.clone();
        let publish_chan = chan.clone();
        let exchange = rabbit_cfg.llm_exchange.clone();
        let routing_key = rabbit_cfg.llm_routing_key.clone();
        async move {
            if event.com.skip_notification {
                return Ok(());
            }
            let explanation = enrich(&client, &llm_cfg, &event).await;
            let enriched = ProbeEvent { explanation: Some(explanation), ..event };
            crate::bus::publish(&publish_chan, &exchange, &routing_key, &enriched).await
        }
    })
    .await
}

async fn enrich(client: &reqwest::Client, cfg: &LlmConfig, event: &ProbeEvent) -> String {
    if !event.com.llm || cfg.api_key.is_empty() {
        return String::new();
    }
    match call_model(client, cfg, event).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(site_id = event.id, error = %e, "llm enrichment failed");
            String::new()
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

async fn call_model(
    client: &reqwest::Client,
    cfg: &LlmConfig,
    event: &ProbeEvent,
) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let snapshot_json = serde_json::to_string(&event.logs)?;
    let prompt = format!(
        "Site \"{}\" ({}) produced this monitoring snapshot: {}. \
         Write a one or two sentence plain text status summary for an on-call engineer.",
        event.name, event.url, snapshot_json
    );

    let body = ChatRequest {
        model: &cfg.model,
        messages: vec![ChatMessage { role: "user", content: prompt }],
    };

    let resp = client
        .post(format!("{}/chat/completions", cfg.base_url.trim_end_matches('/')))
        .bearer_auth(&cfg.api_key)
        .json(&body)
        .timeout(LLM_TIMEOUT)
        .send()
        .await?
        .error_for_status()?
        .json::<ChatResponse>()
        .await?;

    Ok(resp
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default())
}
