// src/services/dispatcher.rs

//! Publishes price-drop events on the message bus.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::bus::{Ack, Acks, MessageBus, Record};
use crate::error::Result;
use crate::models::{BusConfig, PriceDropEvent};
use crate::utils::log;

/// Turns price-drop events into durable bus messages.
///
/// Publishes go out one at a time so drops for the same product reach the
/// partition in the order they were detected.
pub struct NotificationDispatcher {
    bus: Arc<dyn MessageBus>,
    topic: String,
    partition: u32,
    /// Held for the whole publish; remembers the last acknowledged offset.
    last_offset: Mutex<Option<u64>>,
}

impl NotificationDispatcher {
    pub fn new(bus: Arc<dyn MessageBus>, config: &BusConfig) -> Self {
        Self {
            bus,
            topic: config.topic.clone(),
            partition: config.partition,
            last_offset: Mutex::new(None),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Offset of the most recent acknowledged publish.
    pub async fn last_offset(&self) -> Option<u64> {
        *self.last_offset.lock().await
    }

    /// Publish one event and wait for every replica to acknowledge it.
    pub async fn dispatch(&self, event: &PriceDropEvent) -> Result<Ack> {
        let payload = serde_json::to_vec(event)?;
        let record = Record {
            topic: self.topic.clone(),
            partition: self.partition,
            payload,
            acks: Acks::All,
        };

        let mut last_offset = self.last_offset.lock().await;
        match self.bus.publish(record).await {
            Ok(ack) => {
                *last_offset = Some(ack.offset);
                log::debug(&format!(
                    "Dispatched price drop for product {} to {} users at offset {}",
                    event.product_id,
                    event.user_ids.len(),
                    ack.offset
                ));
                Ok(ack)
            }
            Err(e) => {
                log::error(&format!(
                    "Failed to publish price drop for product {}: {e}",
                    event.product_id
                ));
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::StreamExt;

    use crate::bus::{InProcessBus, StartOffset, Subscription};
    use crate::error::AppError;

    fn event(product_id: u64) -> PriceDropEvent {
        PriceDropEvent {
            product_id,
            product_name: "Kettle".to_string(),
            old_price: 100.0,
            new_price: 80.0,
            currency: "TRY".to_string(),
            image_url: String::new(),
            user_ids: vec!["u1".to_string()],
        }
    }

    struct DownBus;

    #[async_trait]
    impl MessageBus for DownBus {
        async fn publish(&self, _record: Record) -> Result<Ack> {
            Err(AppError::bus("broker unreachable"))
        }

        async fn subscribe(&self, _: &str, _: u32, _: StartOffset) -> Result<Subscription> {
            Err(AppError::bus("broker unreachable"))
        }
    }

    #[tokio::test]
    async fn test_dispatch_publishes_json_in_order() {
        let bus = Arc::new(InProcessBus::new(16));
        let dispatcher = NotificationDispatcher::new(bus.clone(), &BusConfig::default());
        let mut sub = bus
            .subscribe(dispatcher.topic(), 0, StartOffset::Latest)
            .await
            .unwrap();

        let first = dispatcher.dispatch(&event(1)).await.unwrap();
        let second = dispatcher.dispatch(&event(2)).await.unwrap();
        assert_eq!((first.offset, second.offset), (0, 1));
        assert_eq!(dispatcher.last_offset().await, Some(1));

        let delivered = sub.next().await.unwrap().unwrap();
        let decoded: PriceDropEvent = serde_json::from_slice(&delivered.payload).unwrap();
        assert_eq!(decoded, event(1));
    }

    #[tokio::test]
    async fn test_publish_failure_is_returned() {
        let dispatcher = NotificationDispatcher::new(Arc::new(DownBus), &BusConfig::default());
        let result = dispatcher.dispatch(&event(1)).await;
        assert!(matches!(result, Err(AppError::Bus(_))));
        assert_eq!(dispatcher.last_offset().await, None);
    }
}
