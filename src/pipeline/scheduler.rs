// src/pipeline/scheduler.rs

//! Recurring refresh of favorited products.
//!
//! On every tick the scheduler collects the distinct favorited product
//! ids, asks a [`ProductRefresher`] for their current state and runs the
//! result through the shared [`ReconciliationEngine`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{Product, ProductId, SchedulerConfig};
use crate::pipeline::reconcile::{ReconcileReport, ReconciliationEngine};
use crate::pipeline::source::{CatalogSource, SnapshotSource};
use crate::storage::{FavoriteStore, StorageHandler};
use crate::utils::log;

/// Produces a fresh snapshot of a product.
#[async_trait]
pub trait ProductRefresher: Send + Sync {
    async fn refresh(&self, id: ProductId) -> Result<Product>;

    /// Refresh several products; one result per id, in order.
    async fn refresh_all(&self, ids: &[ProductId]) -> Vec<(ProductId, Result<Product>)> {
        let mut results = Vec::with_capacity(ids.len());
        for &id in ids {
            results.push((id, self.refresh(id).await));
        }
        results
    }
}

/// Re-reads the stored record. Reconciling it is a no-op, which keeps the
/// loop running without any external feed.
pub struct StoredProductRefresher {
    store: Arc<dyn StorageHandler>,
}

impl StoredProductRefresher {
    pub fn new(store: Arc<dyn StorageHandler>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ProductRefresher for StoredProductRefresher {
    async fn refresh(&self, id: ProductId) -> Result<Product> {
        self.store
            .get_product(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("product {id}")))
    }
}

/// Picks products from a catalog snapshot that an external feed keeps
/// up to date. The file is re-read on every tick.
pub struct SnapshotRefresher {
    source: SnapshotSource,
}

impl SnapshotRefresher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            source: SnapshotSource::new(path),
        }
    }
}

#[async_trait]
impl ProductRefresher for SnapshotRefresher {
    async fn refresh(&self, id: ProductId) -> Result<Product> {
        self.source
            .products()
            .await?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| AppError::not_found(format!("product {id} in snapshot")))
    }

    async fn refresh_all(&self, ids: &[ProductId]) -> Vec<(ProductId, Result<Product>)> {
        let products = match self.source.products().await {
            Ok(products) => products,
            Err(e) => {
                let message = format!("{}: {e}", self.source.path().display());
                return ids
                    .iter()
                    .map(|&id| (id, Err(AppError::store(&message))))
                    .collect();
            }
        };

        ids.iter()
            .map(|&id| {
                let found = products
                    .iter()
                    .find(|p| p.id == id)
                    .cloned()
                    .ok_or_else(|| AppError::not_found(format!("product {id} in snapshot")));
                (id, found)
            })
            .collect()
    }
}

/// Feeds favorited products back through the engine on a fixed interval.
pub struct FavoritePriorityScheduler {
    engine: Arc<ReconciliationEngine>,
    favorites: Arc<dyn FavoriteStore>,
    refresher: Arc<dyn ProductRefresher>,
    interval: Duration,
}

impl FavoritePriorityScheduler {
    pub fn new(
        engine: Arc<ReconciliationEngine>,
        favorites: Arc<dyn FavoriteStore>,
        refresher: Arc<dyn ProductRefresher>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            engine,
            favorites,
            refresher,
            interval: Duration::from_secs(config.interval_secs),
        }
    }

    /// Run one refresh pass.
    pub async fn tick(&self) -> Result<ReconcileReport> {
        let ids = self.favorites.favorited_product_ids().await?;

        let mut products = Vec::with_capacity(ids.len());
        for (id, result) in self.refresher.refresh_all(&ids).await {
            match result {
                Ok(product) => products.push(product),
                Err(e) => log::warn(&format!("Could not refresh favorited product {id}: {e}")),
            }
        }

        Ok(self.engine.reconcile(&products).await)
    }

    /// Tick every interval until `token` is cancelled. Returns the number of
    /// completed passes.
    pub async fn run(&self, token: CancellationToken) -> usize {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut passes = 0;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.tick().await {
                Ok(report) => {
                    passes += 1;
                    if report.price_changed > 0 {
                        report.log_summary("Favorites refresh");
                    }
                }
                Err(e) => log::error(&format!("Favorites refresh failed: {e}")),
            }
        }

        log::info(&format!("Scheduler stopped after {passes} passes"));
        passes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crate::bus::InProcessBus;
    use crate::models::BusConfig;
    use crate::services::NotificationDispatcher;
    use crate::storage::{MemoryStore, PriceHistoryLedger};
    use tempfile::TempDir;

    fn product(id: ProductId, price: f64) -> Product {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "price": {"discountedPrice": price, "currency": "TRY"}
        }))
        .unwrap()
    }

    /// Serves fixed prices and records requested ids.
    #[derive(Default)]
    struct FixedPrices {
        prices: HashMap<ProductId, f64>,
        requested: Mutex<Vec<ProductId>>,
    }

    #[async_trait]
    impl ProductRefresher for FixedPrices {
        async fn refresh(&self, id: ProductId) -> Result<Product> {
            self.requested.lock().unwrap().push(id);
            self.prices
                .get(&id)
                .map(|&price| product(id, price))
                .ok_or_else(|| AppError::not_found(format!("product {id}")))
        }
    }

    fn scheduler(
        store: &Arc<MemoryStore>,
        refresher: Arc<dyn ProductRefresher>,
    ) -> FavoritePriorityScheduler {
        let bus = Arc::new(InProcessBus::new(16));
        let dispatcher = Arc::new(NotificationDispatcher::new(bus, &BusConfig::default()));
        let engine = Arc::new(ReconciliationEngine::new(store.clone(), dispatcher));
        FavoritePriorityScheduler::new(
            engine,
            store.clone(),
            refresher,
            &SchedulerConfig {
                enabled: true,
                interval_secs: 60,
            },
        )
    }

    #[tokio::test]
    async fn test_tick_refreshes_only_favorited_products() {
        let store = Arc::new(MemoryStore::new());
        store
            .save_products(&[product(1, 100.0), product(2, 100.0)])
            .await
            .unwrap();
        store.add_favorite("u1", 1).await.unwrap();

        let refresher = Arc::new(FixedPrices {
            prices: HashMap::from([(1, 80.0), (2, 50.0)]),
            ..FixedPrices::default()
        });
        let report = scheduler(&store, refresher.clone()).tick().await.unwrap();

        assert_eq!(*refresher.requested.lock().unwrap(), vec![1]);
        assert_eq!(report.price_drops, 1);
        assert_eq!(store.history(1).await.unwrap().len(), 1);
        assert!(store.history(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_error_skips_product() {
        let store = Arc::new(MemoryStore::new());
        store.add_favorite("u1", 1).await.unwrap();
        store.add_favorite("u1", 2).await.unwrap();
        store.save_products(&[product(2, 10.0)]).await.unwrap();

        let refresher = Arc::new(FixedPrices {
            prices: HashMap::from([(2, 9.0)]),
            ..FixedPrices::default()
        });
        let report = scheduler(&store, refresher).tick().await.unwrap();

        assert_eq!(report.received, 1);
        assert_eq!(report.price_changed, 1);
    }

    #[tokio::test]
    async fn test_stored_refresher_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        store.save_products(&[product(1, 100.0)]).await.unwrap();
        store.add_favorite("u1", 1).await.unwrap();

        let refresher = Arc::new(StoredProductRefresher::new(store.clone()));
        let report = scheduler(&store, refresher).tick().await.unwrap();

        assert_eq!(report.unchanged, 1);
        assert_eq!(store.history_len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_refresher_picks_by_id() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("feed.json");
        std::fs::write(
            &path,
            r#"{"data": {"contents": [
                {"id": 1, "price": {"discountedPrice": 5.0}},
                {"id": 2, "price": {"discountedPrice": 7.0}}
            ]}}"#,
        )
        .unwrap();

        let refresher = SnapshotRefresher::new(&path);
        let results = refresher.refresh_all(&[2, 3]).await;

        assert_eq!(results[0].1.as_ref().unwrap().tracked_price(), 7.0);
        assert!(matches!(results[1].1, Err(AppError::NotFound(_))));
        assert_eq!(refresher.refresh(1).await.unwrap().id, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_until_cancelled() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = Arc::new(scheduler(&store, Arc::new(FixedPrices::default())));
        let token = CancellationToken::new();

        let handle = tokio::spawn({
            let scheduler = scheduler.clone();
            let token = token.clone();
            async move { scheduler.run(token).await }
        });

        tokio::time::sleep(Duration::from_secs(150)).await;
        token.cancel();
        assert_eq!(handle.await.unwrap(), 2);
    }
}
