//! Redis pub/sub adapters.
//!
//! Pub/sub is not durable: messages published while the consumer is offline
//! are lost.

use std::sync::Arc;
use std::thread;

use async_trait::async_trait;
use domain::Event;
use redis::Commands;
use service::{CHANGE_BATCH_QUANTITY_CHANNEL, EventPublisher, ServiceError, event_payload};
use store::UnitOfWorkFactory;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::consumer;
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum RedisAdapterError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Subscription to {channel} closed")]
    SubscriptionClosed { channel: &'static str },
}

/// Publishes event records with Redis `PUBLISH`.
#[derive(Debug, Clone)]
pub struct RedisPublisher {
    client: redis::Client,
}

impl RedisPublisher {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    pub fn open(redis_url: &str) -> Result<Self, RedisAdapterError> {
        Ok(Self::new(redis::Client::open(redis_url)?))
    }
}

#[async_trait]
impl EventPublisher for RedisPublisher {
    #[tracing::instrument(skip(self, event), fields(event = %event.kind()))]
    async fn publish(&self, channel: &str, event: &Event) -> service::Result<()> {
        let payload = event_payload(event)?;
        let client = self.client.clone();
        let channel = channel.to_string();

        let receivers = tokio::task::spawn_blocking(move || -> redis::RedisResult<i64> {
            let mut conn = client.get_connection()?;
            conn.publish(&channel, payload)
        })
        .await
        .map_err(|e| ServiceError::Publish(e.to_string()))?
        .map_err(|e| ServiceError::Publish(e.to_string()))?;

        tracing::debug!(receivers, "event published");
        Ok(())
    }
}

/// Consumes `change_batch_quantity` messages until the subscription drops.
///
/// The blocking subscription runs on its own thread and forwards payloads
/// to this task, which dispatches them one at a time.
pub async fn run_consumer<F: UnitOfWorkFactory + 'static>(
    state: Arc<AppState<F>>,
    client: redis::Client,
) -> Result<(), RedisAdapterError> {
    let (ready_tx, ready_rx) = oneshot::channel();
    let (tx, mut rx) = mpsc::unbounded_channel();

    thread::spawn(move || subscribe(client, ready_tx, tx));

    ready_rx
        .await
        .map_err(|_| RedisAdapterError::SubscriptionClosed {
            channel: CHANGE_BATCH_QUANTITY_CHANNEL,
        })??;
    tracing::info!(channel = CHANGE_BATCH_QUANTITY_CHANNEL, "subscribed");

    while let Some(payload) = rx.recv().await {
        consumer::process_message(&*state, &payload).await;
    }

    Err(RedisAdapterError::SubscriptionClosed {
        channel: CHANGE_BATCH_QUANTITY_CHANNEL,
    })
}

fn subscribe(
    client: redis::Client,
    ready: oneshot::Sender<redis::RedisResult<()>>,
    tx: mpsc::UnboundedSender<String>,
) {
    let mut conn = match client.get_connection() {
        Ok(conn) => conn,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let mut pubsub = conn.as_pubsub();
    if let Err(e) = pubsub.subscribe(CHANGE_BATCH_QUANTITY_CHANNEL) {
        let _ = ready.send(Err(e));
        return;
    }
    let _ = ready.send(Ok(()));

    loop {
        let msg = match pubsub.get_message() {
            Ok(msg) => msg,
            Err(e) => {
                tracing::error!(error = %e, "redis subscription failed");
                return;
            }
        };

        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "skipping non-text message");
                continue;
            }
        };

        if tx.send(payload).is_err() {
            return;
        }
    }
}
