//! Telegram chat transport. Ported from
//! `original_source/notifier-service/tg-bot/services/telegram_sender.py`:
//! splitting at a safe HTML limit, retry-after backoff, forbidden-chat
//! abandonment, too-long resplit, bounded exponential backoff otherwise.
//!
//! Calls the Bot API directly over HTTP rather than pulling in a bot
//! framework: no such crate is grounded anywhere in the example pack, and
//! `reqwest` is already the system's HTTP client.

use std::time::Duration;

use serde::Deserialize;

const MAX_LEN: usize = 3800;
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(600);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

pub struct ChatSender {
    client: reqwest::Client,
    token: String,
}

#[derive(Deserialize)]
struct TelegramResponse {
    ok: bool,
    error_code: Option<i64>,
    description: Option<String>,
    parameters: Option<TelegramParameters>,
}

#[derive(Deserialize)]
struct TelegramParameters {
    retry_after: Option<u64>,
}

impl ChatSender {
    pub fn new(token: String) -> Self {
        Self { client: reqwest::Client::new(), token }
    }

    fn configured(&self) -> bool {
        !self.token.is_empty()
    }

    /// Sends `text` to `chat_id`, splitting and retrying as needed. Returns
    /// `Ok(())` once every chunk has either been delivered or permanently
    /// abandoned (forbidden chat); transport errors after retries are
    /// logged and swallowed, matching the dispatcher's never-fail-the-whole
    /// -event-on-one-transport-failure contract.
    pub async fn send(&self, chat_id: i64, text: &str) {
        if !self.configured() {
            tracing::warn!("telegram token not configured, skipping send");
            return;
        }
        let mut chunks = split(text, MAX_LEN);
        let mut idx = 0;
        while idx < chunks.len() {
            match self.send_chunk(chat_id, &chunks[idx]).await {
                ChunkOutcome::Sent => idx += 1,
                ChunkOutcome::Abandoned => return,
                ChunkOutcome::Resplit => {
                    let extra = split(&chunks[idx], 1500);
                    chunks.splice(idx..idx + 1, extra);
                }
            }
        }
    }

    async fn send_chunk(&self, chat_id: i64, part: &str) -> ChunkOutcome {
        let mut attempt = 0u32;
        let mut backoff = INITIAL_BACKOFF;
        loop {
            let resp = self
                .client
                .post(format!("https://api.telegram.org/bot{}/sendMessage", self.token))
                .json(&serde_json::json!({
                    "chat_id": chat_id,
                    "text": part,
                    "parse_mode": "HTML",
                    "disable_web_page_preview": true,
                }))
                .send()
                .await;

            let body = match resp {
                Ok(r) => r.json::<TelegramResponse>().await.ok(),
                Err(e) => {
                    tracing::warn!(chat_id, error = %e, "telegram request failed");
                    None
                }
            };

            match body {
                Some(b) if b.ok => return ChunkOutcome::Sent,
                Some(b) if b.error_code == Some(429) => {
                    let delay = b
                        .parameters
                        .and_then(|p| p.retry_after)
                        .map(Duration::from_secs)
                        .unwrap_or(Duration::from_millis(1500));
                    tracing::warn!(chat_id, ?delay, "telegram retry-after");
                    tokio::time::sleep(delay).await;
                }
                Some(b) if b.error_code == Some(403) => {
                    tracing::warn!(chat_id, "telegram forbidden, abandoning chat");
                    return ChunkOutcome::Abandoned;
                }
                Some(b) if b.error_code == Some(400) => {
                    let too_long = b
                        .description
                        .as_deref()
                        .map(|d| d.to_lowercase().contains("message is too long"))
                        .unwrap_or(false);
                    if too_long && part.len() > 1000 {
                        return ChunkOutcome::Resplit;
                    }
                    tracing::warn!(chat_id, description = ?b.description, "telegram bad request");
                    return ChunkOutcome::Abandoned;
                }
                _ => {
                    attempt += 1;
                    if attempt > MAX_RETRIES {
                        tracing::warn!(chat_id, "telegram send failed after retries");
                        return ChunkOutcome::Abandoned;
                    }
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }
}

enum ChunkOutcome {
    Sent,
    Abandoned,
    Resplit,
}

fn split(text: &str, limit: usize) -> Vec<String> {
    if text.len() <= limit {
        return vec![text.to_string()];
    }
    let mut parts = Vec::new();
    let mut current = String::new();
    for line in text.split('\n') {
        let candidate = if current.is_empty() { line.to_string() } else { format!("{}\n{}", current, line) };
        if candidate.len() <= limit {
            current = candidate;
        } else {
            if !current.is_empty() {
                parts.push(current);
            }
            current = line.to_string();
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }

    let mut out = Vec::new();
    for part in parts {
        if part.len() <= limit {
            out.push(part);
        } else {
            let chars: Vec<char> = part.chars().collect();
            for chunk in chars.chunks(limit) {
                out.push(chunk.iter().collect());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        assert_eq!(split("hello", 3800), vec!["hello".to_string()]);
    }

    #[test]
    fn splits_on_newlines_before_hard_slicing() {
        let text = format!("{}\n{}", "a".repeat(10), "b".repeat(10));
        let parts = split(&text, 15);
        assert_eq!(parts, vec!["a".repeat(10), "b".repeat(10)]);
    }

    #[test]
    fn hard_slices_a_single_oversized_line() {
        let text = "x".repeat(25);
        let parts = split(&text, 10);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 10);
    }
}
