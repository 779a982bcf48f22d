//! User favorites and notification audit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ProductId;

/// A user marking a product as favorite.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Favorite {
    pub id: u64,
    pub user_id: String,
    pub product_id: ProductId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Kind of a user-facing notification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PriceDrop,
    BackInStock,
}

/// Delivery audit record written by the notification consumer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: u64,
    pub product_id: ProductId,
    pub user_id: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Information required to create a new [`Notification`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub product_id: ProductId,
    pub user_id: String,
    pub message: String,
    pub kind: NotificationKind,
    pub sent: bool,
}

impl NewNotification {
    /// Assign an id and timestamps.
    pub fn into_notification(self, id: u64, now: DateTime<Utc>) -> Notification {
        Notification {
            id,
            product_id: self.product_id,
            user_id: self.user_id,
            message: self.message,
            kind: self.kind,
            sent: self.sent,
            created_at: now,
            updated_at: now,
        }
    }
}
