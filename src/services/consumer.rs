// src/services/consumer.rs

//! Long-running subscriber that writes notification audit records.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bus::{Delivery, MessageBus, StartOffset, Subscription};
use crate::error::Result;
use crate::models::{BusConfig, NewNotification, NotificationKind, PriceDropEvent};
use crate::storage::NotificationStore;
use crate::utils::log;

/// Counters returned when the consumer stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub delivered: usize,
    pub decoded: usize,
    pub failed_decode: usize,
    pub notifications_written: usize,
    pub write_failures: usize,
    pub transport_errors: usize,
    pub resubscriptions: usize,
}

/// Subscribes to the price-drop topic and persists one notification per
/// (event, user) pair.
pub struct NotificationConsumer {
    bus: Arc<dyn MessageBus>,
    store: Arc<dyn NotificationStore>,
    topic: String,
    partition: u32,
    resubscribe_delay: Duration,
    /// Next offset to be handled; moves past every delivery once handled.
    progress: watch::Sender<u64>,
}

impl NotificationConsumer {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        store: Arc<dyn NotificationStore>,
        config: &BusConfig,
    ) -> Self {
        Self {
            bus,
            store,
            topic: config.topic.clone(),
            partition: config.partition,
            resubscribe_delay: Duration::from_millis(config.resubscribe_delay_ms),
            progress: watch::Sender::new(0),
        }
    }

    /// Watch the offset up to which deliveries have been handled.
    pub fn progress(&self) -> watch::Receiver<u64> {
        self.progress.subscribe()
    }

    /// Subscribe at the live head, then consume in a background task.
    ///
    /// The subscription exists when this returns, so anything published
    /// afterwards is seen.
    pub async fn spawn(self, token: CancellationToken) -> Result<JoinHandle<ConsumerStats>> {
        let subscription = self
            .bus
            .subscribe(&self.topic, self.partition, StartOffset::Latest)
            .await?;
        log::info(&format!(
            "Consumer subscribed to {}:{}",
            self.topic, self.partition
        ));
        Ok(tokio::spawn(async move {
            self.consume(Some(subscription), token).await
        }))
    }

    /// Consume until `token` is cancelled. Errors never end the loop.
    pub async fn run(&self, token: CancellationToken) -> ConsumerStats {
        self.consume(None, token).await
    }

    async fn consume(
        &self,
        mut subscription: Option<Subscription>,
        token: CancellationToken,
    ) -> ConsumerStats {
        let mut stats = ConsumerStats::default();
        let mut next_offset: Option<u64> = None;

        'session: loop {
            let mut stream = match subscription.take() {
                Some(stream) => stream,
                None => {
                    // Resume right after the last delivery so a reconnect
                    // does not open a gap.
                    let start = next_offset.map_or(StartOffset::Latest, StartOffset::At);
                    let subscribed = tokio::select! {
                        _ = token.cancelled() => break 'session,
                        result = self.bus.subscribe(&self.topic, self.partition, start) => result,
                    };
                    match subscribed {
                        Ok(stream) => stream,
                        Err(e) => {
                            log::warn(&format!("Subscribe to {} failed: {e}", self.topic));
                            if self.pause(&token).await {
                                break 'session;
                            }
                            continue 'session;
                        }
                    }
                }
            };

            loop {
                let next = tokio::select! {
                    _ = token.cancelled() => break 'session,
                    next = stream.next() => next,
                };

                match next {
                    Some(Ok(delivery)) => {
                        next_offset = Some(delivery.offset + 1);
                        self.handle(&delivery, &mut stats).await;
                        self.progress.send_replace(delivery.offset + 1);
                    }
                    Some(Err(e)) => {
                        stats.transport_errors += 1;
                        log::warn(&format!("Consumer transport error: {e}"));
                    }
                    None => {
                        log::warn(&format!(
                            "Subscription to {} closed; resubscribing",
                            self.topic
                        ));
                        break;
                    }
                }
            }

            stats.resubscriptions += 1;
            if self.pause(&token).await {
                break 'session;
            }
        }

        log::info(&format!(
            "Consumer stopped after {} deliveries ({} notifications)",
            stats.delivered, stats.notifications_written
        ));
        stats
    }

    async fn handle(&self, delivery: &Delivery, stats: &mut ConsumerStats) {
        stats.delivered += 1;

        let event: PriceDropEvent = match serde_json::from_slice(&delivery.payload) {
            Ok(event) => event,
            Err(e) => {
                stats.failed_decode += 1;
                log::warn(&format!(
                    "Skipping undecodable message at offset {}: {e}",
                    delivery.offset
                ));
                return;
            }
        };
        stats.decoded += 1;

        let message = event.message_text();
        for user_id in &event.user_ids {
            let notification = NewNotification {
                product_id: event.product_id,
                user_id: user_id.clone(),
                message: message.clone(),
                kind: NotificationKind::PriceDrop,
                sent: true,
            };
            match self.store.insert_notification(notification).await {
                Ok(_) => stats.notifications_written += 1,
                Err(e) => {
                    stats.write_failures += 1;
                    log::error(&format!(
                        "Failed to record notification for user {user_id}, product {}: {e}",
                        event.product_id
                    ));
                }
            }
        }
    }

    /// Wait before resubscribing. Returns `true` if cancelled meanwhile.
    async fn pause(&self, token: &CancellationToken) -> bool {
        tokio::select! {
            _ = token.cancelled() => true,
            _ = tokio::time::sleep(self.resubscribe_delay) => false,
        }
    }
}
