//! In-memory record store.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{AppError, Result};
use crate::models::{
    CategoryTree, Favorite, NewNotification, Notification, PriceHistoryEntry, Product, ProductId,
    Variant,
};
use crate::storage::{FavoriteStore, NotificationStore, PriceHistoryLedger, StorageHandler};

#[derive(Debug, Default)]
struct State {
    products: BTreeMap<ProductId, Product>,
    history: Vec<PriceHistoryEntry>,
    favorites: Vec<Favorite>,
    notifications: Vec<Notification>,
    categories: CategoryTree,
    variants: BTreeMap<u64, Variant>,
    images: BTreeSet<String>,
}

/// Record store kept in process memory.
///
/// One mutex guards the whole state, so every call is atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| AppError::store("memory store lock poisoned"))
    }

    /// Number of price history rows across all products.
    pub fn history_len(&self) -> Result<usize> {
        Ok(self.lock()?.history.len())
    }

    /// The last saved category tree.
    pub fn categories(&self) -> Result<CategoryTree> {
        Ok(self.lock()?.categories.clone())
    }

    /// Saved variants, ordered by id.
    pub fn variants(&self) -> Result<Vec<Variant>> {
        Ok(self.lock()?.variants.values().cloned().collect())
    }

    /// Saved image URLs, sorted.
    pub fn images(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.images.iter().cloned().collect())
    }
}

#[async_trait]
impl StorageHandler for MemoryStore {
    async fn save_categories(&self, tree: &CategoryTree) -> Result<()> {
        self.lock()?.categories = tree.clone();
        Ok(())
    }

    async fn save_products(&self, products: &[Product]) -> Result<()> {
        let mut state = self.lock()?;
        for product in products {
            state.products.insert(product.id, product.clone());
        }
        Ok(())
    }

    async fn save_variants(&self, variants: &[Variant]) -> Result<()> {
        let mut state = self.lock()?;
        for variant in variants {
            state.variants.insert(variant.id, variant.clone());
        }
        Ok(())
    }

    async fn save_images(&self, urls: &[String]) -> Result<()> {
        self.lock()?.images.extend(urls.iter().cloned());
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.lock()?.products.get(&id).cloned())
    }
}

#[async_trait]
impl PriceHistoryLedger for MemoryStore {
    async fn record_price_change(
        &self,
        product: &Product,
        entry: &PriceHistoryEntry,
    ) -> Result<()> {
        let mut state = self.lock()?;
        state.history.push(entry.clone());
        state.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn history(&self, id: ProductId) -> Result<Vec<PriceHistoryEntry>> {
        let mut entries: Vec<_> = self
            .lock()?
            .history
            .iter()
            .filter(|e| e.product_id == id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.recorded_at);
        Ok(entries)
    }
}

#[async_trait]
impl FavoriteStore for MemoryStore {
    async fn add_favorite(&self, user_id: &str, product_id: ProductId) -> Result<Favorite> {
        let mut state = self.lock()?;
        if let Some(existing) = state
            .favorites
            .iter()
            .find(|f| f.user_id == user_id && f.product_id == product_id)
        {
            return Ok(existing.clone());
        }
        let now = Utc::now();
        let favorite = Favorite {
            id: state.favorites.len() as u64 + 1,
            user_id: user_id.to_string(),
            product_id,
            created_at: now,
            updated_at: now,
        };
        state.favorites.push(favorite.clone());
        Ok(favorite)
    }

    async fn favorites_for(&self, id: ProductId) -> Result<Vec<Favorite>> {
        Ok(self
            .lock()?
            .favorites
            .iter()
            .filter(|f| f.product_id == id)
            .cloned()
            .collect())
    }

    async fn favorited_product_ids(&self) -> Result<Vec<ProductId>> {
        let ids: BTreeSet<_> = self.lock()?.favorites.iter().map(|f| f.product_id).collect();
        Ok(ids.into_iter().collect())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert_notification(&self, notification: NewNotification) -> Result<Notification> {
        let mut state = self.lock()?;
        let id = state.notifications.len() as u64 + 1;
        let notification = notification.into_notification(id, Utc::now());
        state.notifications.push(notification.clone());
        Ok(notification)
    }

    async fn notifications(&self) -> Result<Vec<Notification>> {
        Ok(self.lock()?.notifications.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationKind;

    fn product(id: ProductId, price: f64) -> Product {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": format!("Product {id}"),
            "price": {"discountedPrice": price, "currency": "TRY"}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_save_and_get_product() {
        let store = MemoryStore::new();
        assert!(store.get_product(1).await.unwrap().is_none());

        store.save_products(&[product(1, 10.0)]).await.unwrap();
        let stored = store.get_product(1).await.unwrap().unwrap();
        assert_eq!(stored.tracked_price(), 10.0);
    }

    #[tokio::test]
    async fn test_record_price_change_updates_both() {
        let store = MemoryStore::new();
        store.save_products(&[product(1, 10.0)]).await.unwrap();

        let updated = product(1, 8.0);
        let entry = PriceHistoryEntry::observe(&updated, Utc::now());
        store.record_price_change(&updated, &entry).await.unwrap();

        assert_eq!(store.get_product(1).await.unwrap().unwrap().tracked_price(), 8.0);
        assert_eq!(store.history(1).await.unwrap(), vec![entry]);
        assert!(store.history(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_favorites_are_deduplicated() {
        let store = MemoryStore::new();
        let first = store.add_favorite("u1", 5).await.unwrap();
        let again = store.add_favorite("u1", 5).await.unwrap();
        store.add_favorite("u2", 5).await.unwrap();
        store.add_favorite("u2", 3).await.unwrap();

        assert_eq!(first, again);
        assert_eq!(store.favorites_for(5).await.unwrap().len(), 2);
        assert_eq!(store.favorited_product_ids().await.unwrap(), vec![3, 5]);
    }

    #[tokio::test]
    async fn test_notification_ids_increase() {
        let store = MemoryStore::new();
        for user in ["a", "b"] {
            store
                .insert_notification(NewNotification {
                    product_id: 1,
                    user_id: user.to_string(),
                    message: "Price dropped".to_string(),
                    kind: NotificationKind::PriceDrop,
                    sent: true,
                })
                .await
                .unwrap();
        }

        let ids: Vec<_> = store
            .notifications()
            .await
            .unwrap()
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_images_are_unique() {
        let store = MemoryStore::new();
        let urls = vec!["https://cdn/a.jpg".to_string(), "https://cdn/a.jpg".to_string()];
        store.save_images(&urls).await.unwrap();
        assert_eq!(store.images().unwrap(), vec!["https://cdn/a.jpg".to_string()]);
    }
}
