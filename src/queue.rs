// ABOUTME: Durable pub/sub adapter: publish, durable queue-subscribe with manual ack, unsubscribe
// ABOUTME: Backed by async-nats against a JetStream-enabled server; surfaces connection loss via watch

use async_nats::jetstream::consumer::{pull::Config as PullConfig, AckPolicy};
use async_nats::jetstream::stream::Config as StreamConfig;
use async_nats::jetstream::Context as JetStreamContext;
use bytes::Bytes;
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue transport error: {0}")]
    Transport(String),
}

/// A message pulled off a durable subscription, carrying its own ack handle.
///
/// The handler owns the acknowledgment decision: acking marks the message
/// delivered, leaving it unacked causes redelivery after `ack_wait`.
pub struct QueueMessage {
    pub payload: Bytes,
    inner: async_nats::jetstream::Message,
}

impl QueueMessage {
    pub async fn ack(self) {
        if let Err(err) = self.inner.ack().await {
            warn!(error = %err, "failed to acknowledge queue message");
        }
    }
}

/// Options controlling a durable queue subscription.
#[derive(Debug, Clone)]
pub struct SubscribeOptions {
    pub durable_name: String,
    pub ack_wait: Duration,
    pub max_inflight: usize,
}

/// Handle to a running subscription; dropping or calling [`unsubscribe`] stops
/// the pull loop without deleting the durable consumer's cursor.
///
/// [`unsubscribe`]: SubscriptionHandle::unsubscribe
pub struct SubscriptionHandle {
    stop: Option<tokio::sync::oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl SubscriptionHandle {
    pub async fn unsubscribe(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Thin wrapper over a JetStream context, exposing the publish/subscribe
/// contract the sub-route workers depend on.
#[derive(Clone)]
pub struct QueueAdapter {
    jetstream: JetStreamContext,
    connected: watch::Sender<bool>,
}

impl QueueAdapter {
    /// Connects to `url` and returns an adapter plus a receiver the health
    /// endpoint can poll for connection-loss signaling.
    pub async fn connect(
        url: &str,
        stream_prefix: &str,
    ) -> Result<(Self, watch::Receiver<bool>), QueueError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;

        let (connected_tx, connected_rx) = watch::channel(true);
        let mut disconnects = client.subscribe("$SYS.>".to_string()).await.ok();
        let connected_tx_clone = connected_tx.clone();
        tokio::spawn(async move {
            if let Some(mut sub) = disconnects.take() {
                while sub.next().await.is_some() {}
            }
            let _ = connected_tx_clone.send(false);
        });

        let jetstream = async_nats::jetstream::new(client);
        jetstream
            .get_or_create_stream(StreamConfig {
                name: format!("{stream_prefix}_messages"),
                subjects: vec![format!("{stream_prefix}.>"), "*.message.>".to_string()],
                ..Default::default()
            })
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;

        Ok((
            Self {
                jetstream,
                connected: connected_tx,
            },
            connected_rx,
        ))
    }

    /// Publishes `payload` to `subject`. Success means the bus accepted the
    /// message, not that a subscriber has seen it.
    pub async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), QueueError> {
        let ack = self
            .jetstream
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;
        ack.await.map_err(|e| QueueError::Transport(e.to_string()))?;
        Ok(())
    }

    /// Starts a durable, shared pull subscription. `handler` receives each
    /// message and is responsible for acknowledging it; messages left unacked
    /// are redelivered after `opts.ack_wait`.
    pub async fn queue_subscribe<F, Fut>(
        &self,
        subject: &str,
        opts: SubscribeOptions,
        handler: F,
    ) -> Result<SubscriptionHandle, QueueError>
    where
        F: Fn(QueueMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let stream = self
            .jetstream
            .get_stream_by_subject(subject)
            .await
            .or(self
                .jetstream
                .get_or_create_stream(StreamConfig {
                    name: opts.durable_name.clone(),
                    subjects: vec![subject.to_string()],
                    ..Default::default()
                })
                .await)
            .map_err(|e| QueueError::Transport(e.to_string()))?;

        let consumer = stream
            .get_or_create_consumer(
                &opts.durable_name,
                PullConfig {
                    durable_name: Some(opts.durable_name.clone()),
                    filter_subject: subject.to_string(),
                    ack_policy: AckPolicy::Explicit,
                    ack_wait: opts.ack_wait,
                    max_ack_pending: opts.max_inflight as i64,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;

        let handler = Arc::new(handler);
        let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel();
        let durable_name = opts.durable_name.clone();

        let task = tokio::spawn(async move {
            let mut messages = match consumer.messages().await {
                Ok(messages) => messages,
                Err(err) => {
                    error!(error = %err, durable_name, "failed to start consumer message stream");
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        info!(durable_name, "subscription stopped");
                        break;
                    }
                    next = messages.next() => {
                        match next {
                            Some(Ok(message)) => {
                                let payload = message.payload.clone();
                                let queue_message = QueueMessage { payload, inner: message };
                                let handler = Arc::clone(&handler);
                                tokio::spawn(async move { handler(queue_message).await });
                            }
                            Some(Err(err)) => {
                                warn!(error = %err, durable_name, "error pulling message");
                            }
                            None => break,
                        }
                    }
                }
            }
        });

        Ok(SubscriptionHandle {
            stop: Some(stop_tx),
            task: Some(task),
        })
    }

    pub fn mark_disconnected(&self) {
        let _ = self.connected.send(false);
    }
}
