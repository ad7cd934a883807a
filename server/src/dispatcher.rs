//! Dispatcher: resolves recipients for an enriched probe event, applies
//! anti-spam suppression, and fans out to chat and email transports.
//!
//! Site resolution and chat-id dedup are grounded on
//! `original_source/notifier-service/dispatcher/services/recipients.py`;
//! the event pipeline as a whole follows spec §4.7.

use std::collections::HashSet;
use std::sync::Arc;

use common::ProbeEvent;
use lapin::Channel;
use store::OperationalStore;

use crate::antispam::AntiSpam;
use crate::config::{DispatcherConfig, RabbitConfig};
use crate::senders::{chat::ChatSender, email::EmailSender};

pub async fn run(
    chan: Channel,
    rabbit_cfg: RabbitConfig,
    dispatcher_cfg: DispatcherConfig,
    operational: Arc<OperationalStore>,
    antispam: Arc<AntiSpam>,
    chat: Arc<ChatSender>,
    email: Arc<EmailSender>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    crate::bus::consume(&chan, &rabbit_cfg.llm_to_dispatcher_queue, "dispatcher", move |event| {
        let operational = operational.clone();
        let antispam = antispam.clone();
        let chat = chat.clone();
        let email = email.clone();
        let dispatcher_cfg = dispatcher_cfg.clone();
        async move { handle(event, &operational, &antispam, &chat, &email, &dispatcher_cfg).await }
    })
    .await
}

async fn handle(
    event: ProbeEvent,
    operational: &OperationalStore,
    antispam: &AntiSpam,
    chat: &ChatSender,
    email: &EmailSender,
    dispatcher_cfg: &DispatcherConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if event.com.skip_notification {
        return Ok(());
    }

    let Some(site_id) = resolve_site_id(&event, operational, dispatcher_cfg.autocreate_sites).await? else {
        tracing::warn!(url = %event.url, "dispatcher: could not resolve site, dropping event");
        return Ok(());
    };

    let incident_key = event.incident_key();
    if !antispam.should_send(site_id, &incident_key).await {
        return Ok(());
    }

    let teams = operational.list_teams_tracking(site_id).await?;

    let mut chat_ids: Vec<i64> = teams.iter().filter_map(|t| t.tg_chat_id).collect();
    if let Some(override_chat) = event.com.tg {
        chat_ids.push(override_chat);
    }
    let chat_ids = dedup(chat_ids);

    let email_groups: Vec<(String, Vec<String>)> = teams
        .iter()
        .filter(|t| !t.email_recipients.is_empty())
        .map(|t| (t.name.clone(), dedup(t.email_recipients.iter().cloned().collect())))
        .collect();

    let chat_text = crate::formatters::format_telegram(&event);
    for chat_id in &chat_ids {
        chat.send(*chat_id, &chat_text).await;
    }

    if !email_groups.is_empty() {
        let subject = crate::formatters::format_email_subject(&event);
        let (plain, html) = crate::formatters::format_email_bodies(&event);
        let sends = email_groups.iter().map(|(_, recipients)| email.send(recipients, &subject, &plain, &html));
        futures::future::join_all(sends).await;
    }

    antispam.mark_sent(site_id, &incident_key).await;
    Ok(())
}

async fn resolve_site_id(
    event: &ProbeEvent,
    operational: &OperationalStore,
    autocreate: bool,
) -> Result<Option<i64>, Box<dyn std::error::Error + Send + Sync>> {
    if let Some(site) = operational.get_site_by_id(event.id).await? {
        return Ok(Some(site.id));
    }
    if event.url.is_empty() {
        return Ok(None);
    }
    if let Some(site) = operational.get_site_by_url(&event.url).await? {
        return Ok(Some(site.id));
    }
    if autocreate {
        let name = if event.name.is_empty() { event.url.clone() } else { event.name.clone() };
        let site = operational.ensure_site(&event.url, &name, 30).await?;
        return Ok(Some(site.id));
    }
    Ok(None)
}

fn dedup<T: Eq + std::hash::Hash + Clone>(items: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(item.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_preserves_first_occurrence_order() {
        let result = dedup(vec![3, 1, 3, 2, 1]);
        assert_eq!(result, vec![3, 1, 2]);
    }
}
