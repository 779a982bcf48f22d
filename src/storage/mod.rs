//! Storage abstractions for catalog state, price history, favorites and
//! notification audit records.
//!
//! Backends:
//! - [`MemoryStore`]: process-local state, used by tests and dry runs
//! - [`LocalStore`]: persisted journals and JSON files
//! - [`SnapshotStore`]: timestamped flat-file snapshots of saved batches
//!
//! ## Directory Structure (LocalStore)
//!
//! ```text
//! {data_dir}/
//! ├── catalog.jsonl         # Product upserts + price changes, one line per call
//! ├── notifications.jsonl   # Delivery audit records, one line each
//! ├── categories.json       # Last crawled category tree
//! ├── variants.json
//! ├── images.json
//! └── favorites.json
//! ```

pub mod local;
pub mod memory;
pub mod snapshot;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    CategoryTree, Favorite, NewNotification, Notification, PriceHistoryEntry, Product, ProductId,
    Variant,
};

// Re-export for convenience
pub use local::LocalStore;
pub use memory::MemoryStore;
pub use snapshot::SnapshotStore;

/// Save/get contract of the record store.
///
/// Every save is transactional per call.
#[async_trait]
pub trait StorageHandler: Send + Sync {
    /// Replace the stored category tree with the tree of one crawl run.
    async fn save_categories(&self, tree: &CategoryTree) -> Result<()>;

    /// Insert or fully overwrite products by id.
    async fn save_products(&self, products: &[Product]) -> Result<()>;

    /// Insert or overwrite variants by id.
    async fn save_variants(&self, variants: &[Variant]) -> Result<()>;

    /// Record image URLs.
    async fn save_images(&self, urls: &[String]) -> Result<()>;

    /// Look up a product; `Ok(None)` means it has never been seen.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;
}

/// Append-only price history.
#[async_trait]
pub trait PriceHistoryLedger: Send + Sync {
    /// Overwrite the product and append the history entry in one transaction.
    async fn record_price_change(&self, product: &Product, entry: &PriceHistoryEntry)
    -> Result<()>;

    /// History of one product, ordered by `recorded_at`.
    async fn history(&self, id: ProductId) -> Result<Vec<PriceHistoryEntry>>;
}

/// User favorites.
#[async_trait]
pub trait FavoriteStore: Send + Sync {
    /// Add a favorite; an existing (user, product) pair is returned as is.
    async fn add_favorite(&self, user_id: &str, product_id: ProductId) -> Result<Favorite>;

    /// Favorites pointing at one product.
    async fn favorites_for(&self, id: ProductId) -> Result<Vec<Favorite>>;

    /// Distinct favorited product ids, ascending.
    async fn favorited_product_ids(&self) -> Result<Vec<ProductId>>;
}

/// Notification audit records.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert_notification(&self, notification: NewNotification) -> Result<Notification>;

    async fn notifications(&self) -> Result<Vec<Notification>>;
}

/// Everything the reconciliation pipeline needs from one backend.
pub trait Store: StorageHandler + PriceHistoryLedger + FavoriteStore + NotificationStore {}

impl<T> Store for T where T: StorageHandler + PriceHistoryLedger + FavoriteStore + NotificationStore {}
