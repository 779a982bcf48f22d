//! Publish/subscribe message bus.
//!
//! The pipeline only depends on [`MessageBus`]; [`InProcessBus`] is the
//! bundled implementation with per-partition offsets and live fan-out.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use crate::error::Result;

pub use memory::InProcessBus;

/// Acknowledgment level requested for a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acks {
    /// Fire and forget
    None,
    /// Leader replica only
    Leader,
    /// Every in-sync replica
    All,
}

/// A message to publish.
#[derive(Debug, Clone)]
pub struct Record {
    pub topic: String,
    pub partition: u32,
    pub payload: Vec<u8>,
    pub acks: Acks,
}

/// Broker acknowledgment of a published record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
}

/// Where a new subscription starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOffset {
    /// Replay the whole partition log
    Earliest,
    /// Only records published after subscribing
    Latest,
    /// Replay from a known offset
    At(u64),
}

/// A record delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    pub payload: Vec<u8>,
    pub published_at: DateTime<Utc>,
}

/// Stream of deliveries; `Err` items are transport errors and the stream
/// keeps going after them. The stream ends when the subscription closes.
pub type Subscription = BoxStream<'static, Result<Delivery>>;

/// Publish/subscribe contract of the message bus.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish a record and wait for the requested acknowledgment.
    async fn publish(&self, record: Record) -> Result<Ack>;

    /// Subscribe to one partition of a topic.
    async fn subscribe(&self, topic: &str, partition: u32, start: StartOffset)
    -> Result<Subscription>;
}
