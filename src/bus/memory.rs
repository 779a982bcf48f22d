//! In-process message bus.
//!
//! Each (topic, partition) keeps a log that assigns offsets and retains the
//! newest `retention` records, plus a broadcast channel that fans new
//! records out to live subscribers. A subscriber that falls more than
//! `capacity` records behind is caught up from the log, so a slow reader
//! never skips a retained record. Only records that already left the log
//! are reported as a transport error.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use futures::{StreamExt, stream};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::bus::{Ack, Delivery, MessageBus, Record, StartOffset, Subscription};
use crate::error::{AppError, Result};
use crate::models::BusConfig;

/// Records kept per partition when no retention is configured.
pub const DEFAULT_RETENTION: usize = 100_000;

type PartitionKey = (String, u32);
type Partitions = Arc<Mutex<HashMap<PartitionKey, Partition>>>;

struct Partition {
    /// Offset of the oldest retained record
    base: u64,
    log: VecDeque<Delivery>,
    live: broadcast::Sender<Delivery>,
}

impl Partition {
    fn new(capacity: usize) -> Self {
        let (live, _) = broadcast::channel(capacity);
        Self {
            base: 0,
            log: VecDeque::new(),
            live,
        }
    }

    fn next_offset(&self) -> u64 {
        self.base + self.log.len() as u64
    }

    /// Retained records from `offset` on, and how many records before the
    /// oldest retained one were asked for but are gone.
    fn read_from(&self, offset: u64) -> (Vec<Delivery>, u64) {
        let skip = offset.saturating_sub(self.base) as usize;
        let expired = self.base.saturating_sub(offset);
        (self.log.iter().skip(skip).cloned().collect(), expired)
    }
}

fn lock(partitions: &Partitions) -> Result<MutexGuard<'_, HashMap<PartitionKey, Partition>>> {
    partitions
        .lock()
        .map_err(|_| AppError::bus("partition table lock poisoned"))
}

/// Message bus living inside the current process.
pub struct InProcessBus {
    partitions: Partitions,
    capacity: usize,
    retention: usize,
}

impl InProcessBus {
    /// Create a bus whose subscribers buffer up to `capacity` live records.
    pub fn new(capacity: usize) -> Self {
        Self::with_retention(capacity, DEFAULT_RETENTION)
    }

    /// Create a bus that keeps at most `retention` records per partition.
    ///
    /// Retention never drops below `capacity`.
    pub fn with_retention(capacity: usize, retention: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            partitions: Arc::new(Mutex::new(HashMap::new())),
            capacity,
            retention: retention.max(capacity),
        }
    }

    pub fn from_config(config: &BusConfig) -> Self {
        Self::with_retention(config.capacity, config.retention)
    }

    /// Number of records retained in a partition log.
    pub fn log_len(&self, topic: &str, partition: u32) -> Result<usize> {
        Ok(lock(&self.partitions)?
            .get(&(topic.to_string(), partition))
            .map_or(0, |p| p.log.len()))
    }

    /// Close every live subscription of a partition, as a broker restart
    /// would. The log is kept.
    pub fn drop_subscribers(&self, topic: &str, partition: u32) -> Result<()> {
        let mut partitions = lock(&self.partitions)?;
        if let Some(p) = partitions.get_mut(&(topic.to_string(), partition)) {
            let (live, _) = broadcast::channel(self.capacity);
            p.live = live;
        }
        Ok(())
    }
}

#[async_trait]
impl MessageBus for InProcessBus {
    async fn publish(&self, record: Record) -> Result<Ack> {
        let mut partitions = lock(&self.partitions)?;
        let partition = partitions
            .entry((record.topic.clone(), record.partition))
            .or_insert_with(|| Partition::new(self.capacity));

        let delivery = Delivery {
            topic: record.topic,
            partition: record.partition,
            offset: partition.next_offset(),
            payload: record.payload,
            published_at: Utc::now(),
        };
        partition.log.push_back(delivery.clone());
        while partition.log.len() > self.retention {
            partition.log.pop_front();
            partition.base += 1;
        }

        // No live subscribers is not an error; the record stays in the log.
        let _ = partition.live.send(delivery.clone());

        log::trace!(
            "Published {}:{} offset {} (acks {:?})",
            delivery.topic,
            delivery.partition,
            delivery.offset,
            record.acks
        );

        Ok(Ack {
            topic: delivery.topic,
            partition: delivery.partition,
            offset: delivery.offset,
        })
    }

    async fn subscribe(
        &self,
        topic: &str,
        partition: u32,
        start: StartOffset,
    ) -> Result<Subscription> {
        let key = (topic.to_string(), partition);
        let mut partitions = lock(&self.partitions)?;
        let p = partitions
            .entry(key.clone())
            .or_insert_with(|| Partition::new(self.capacity));

        // Backlog and receiver are taken under the same lock, so nothing is
        // delivered twice or skipped between them.
        let next = match start {
            StartOffset::Earliest => p.base,
            StartOffset::Latest => p.next_offset(),
            StartOffset::At(offset) => offset,
        };
        let (backlog, expired) = p.read_from(next);
        let cursor = Cursor {
            partitions: Arc::clone(&self.partitions),
            key,
            rx: p.live.subscribe(),
            pending: backlog.into(),
            next,
            expired,
        };
        drop(partitions);

        Ok(stream::unfold(cursor, |mut cursor| async move {
            cursor.next().await.map(|item| (item, cursor))
        })
        .boxed())
    }
}

/// Read position of one subscription.
struct Cursor {
    partitions: Partitions,
    key: PartitionKey,
    rx: broadcast::Receiver<Delivery>,
    /// Records read from the log and not handed out yet
    pending: VecDeque<Delivery>,
    /// Offset of the next record this subscriber expects
    next: u64,
    /// Records that left the log before they could be delivered
    expired: u64,
}

impl Cursor {
    async fn next(&mut self) -> Option<Result<Delivery>> {
        loop {
            if self.expired > 0 {
                let expired = std::mem::take(&mut self.expired);
                return Some(Err(AppError::bus(format!(
                    "{expired} records on {}:{} expired before delivery",
                    self.key.0, self.key.1
                ))));
            }
            if let Some(delivery) = self.pending.pop_front() {
                self.next = delivery.offset + 1;
                return Some(Ok(delivery));
            }

            match self.rx.recv().await {
                // Already handed out from the log.
                Ok(delivery) if delivery.offset < self.next => continue,
                Ok(delivery) => {
                    self.next = delivery.offset + 1;
                    return Some(Ok(delivery));
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::debug!(
                        "Subscriber on {}:{} lagged by {skipped} records, replaying from offset {}",
                        self.key.0,
                        self.key.1,
                        self.next
                    );
                    if let Err(e) = self.catch_up() {
                        return Some(Err(e));
                    }
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    fn catch_up(&mut self) -> Result<()> {
        let partitions = lock(&self.partitions)?;
        if let Some(p) = partitions.get(&self.key) {
            let (records, expired) = p.read_from(self.next);
            self.expired += expired;
            self.pending.extend(records);
        }
        Ok(())
    }
}
