//! Message bus topology: two durable topic exchanges, five durable queues
//! bound to literal routing keys. Grounded on
//! `original_source/backend/app/broker.py` and
//! `original_source/notifier-service/broker/broker.py`.

use common::ProbeEvent;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, ExchangeDeclareOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};

use crate::config::RabbitConfig;

pub struct Bus {
    conn: Connection,
}

impl Bus {
    pub async fn connect(cfg: &RabbitConfig) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let conn = Connection::connect(&cfg.url, ConnectionProperties::default()).await?;
        let bus = Self { conn };
        bus.declare_topology(cfg).await?;
        Ok(bus)
    }

    async fn declare_topology(&self, cfg: &RabbitConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let chan = self.conn.create_channel().await?;

        chan.exchange_declare(
            &cfg.pinger_exchange,
            ExchangeKind::Topic,
            ExchangeDeclareOptions { durable: true, ..Default::default() },
            FieldTable::default(),
        )
        .await?;
        chan.exchange_declare(
            &cfg.llm_exchange,
            ExchangeKind::Topic,
            ExchangeDeclareOptions { durable: true, ..Default::default() },
            FieldTable::default(),
        )
        .await?;

        for queue in [&cfg.pinger_to_llm_queue, &cfg.pinger_to_web_queue] {
            declare_and_bind(&chan, queue, &cfg.pinger_exchange, &cfg.pinger_routing_key).await?;
        }
        for queue in [&cfg.llm_to_dispatcher_queue, &cfg.llm_to_sender_queue, &cfg.llm_to_web_queue] {
            declare_and_bind(&chan, queue, &cfg.llm_exchange, &cfg.llm_routing_key).await?;
        }

        Ok(())
    }

    pub async fn channel(&self) -> Result<Channel, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.conn.create_channel().await?)
    }
}

async fn declare_and_bind(
    chan: &Channel,
    queue: &str,
    exchange: &str,
    routing_key: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    chan.queue_declare(queue, QueueDeclareOptions { durable: true, ..Default::default() }, FieldTable::default())
        .await?;
    chan.queue_bind(queue, exchange, routing_key, QueueBindOptions::default(), FieldTable::default())
        .await?;
    Ok(())
}

pub async fn publish(
    chan: &Channel,
    exchange: &str,
    routing_key: &str,
    event: &ProbeEvent,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let body = serde_json::to_vec(event)?;
    chan.basic_publish(
        exchange,
        routing_key,
        BasicPublishOptions::default(),
        &body,
        BasicProperties::default(),
    )
    .await?
    .await?;
    Ok(())
}

/// Starts a consumer loop that decodes `ProbeEvent`s, calls `handler`, and
/// acks on success. Handler failures nack without requeue: the next probe
/// cycle re-emits ground truth, so a dropped message is never retried
/// in-place (spec §7).
pub async fn consume<F, Fut>(
    chan: &Channel,
    queue: &str,
    consumer_tag: &str,
    mut handler: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: FnMut(ProbeEvent) -> Fut,
    Fut: std::future::Future<Output = Result<(), Box<dyn std::error::Error + Send + Sync>>>,
{
    let mut consumer = chan
        .basic_consume(queue, consumer_tag, BasicConsumeOptions::default(), FieldTable::default())
        .await?;

    use futures::StreamExt;
    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(queue, error = %e, "bus consume error");
                continue;
            }
        };
        let event: Result<ProbeEvent, _> = serde_json::from_slice(&delivery.data);
        match event {
            Ok(event) => match handler(event).await {
                Ok(()) => {
                    if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                        tracing::warn!(queue, error = %e, "failed to ack message");
                    }
                }
                Err(e) => {
                    tracing::warn!(queue, error = %e, "handler failed, dropping message");
                    let _ = delivery.nack(BasicNackOptions { requeue: false, ..Default::default() }).await;
                }
            },
            Err(e) => {
                tracing::warn!(queue, error = %e, "malformed event, dropping");
                let _ = delivery.nack(BasicNackOptions { requeue: false, ..Default::default() }).await;
            }
        }
    }
    Ok(())
}
