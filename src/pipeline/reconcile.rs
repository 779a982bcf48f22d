// src/pipeline/reconcile.rs

//! Price reconciliation.
//!
//! Compares incoming products with stored state, records price changes in
//! the ledger, and hands price drops on favorited products to the
//! dispatcher.

use std::slice;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{PriceDropEvent, PriceHistoryEntry, Product};
use crate::services::NotificationDispatcher;
use crate::storage::Store;
use crate::utils::log;

/// Per-batch counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub received: usize,
    pub inserted: usize,
    pub unchanged: usize,
    pub price_changed: usize,
    pub price_drops: usize,
    pub events_published: usize,
    pub publish_failures: usize,
    pub skipped: usize,
}

impl ReconcileReport {
    pub fn log_summary(&self, title: &str) {
        log::summary(
            title,
            &[
                ("Received", self.received.to_string()),
                ("Inserted", self.inserted.to_string()),
                ("Unchanged", self.unchanged.to_string()),
                ("Price changed", self.price_changed.to_string()),
                ("Price drops", self.price_drops.to_string()),
                ("Events published", self.events_published.to_string()),
                ("Publish failures", self.publish_failures.to_string()),
                ("Skipped", self.skipped.to_string()),
            ],
        );
    }
}

/// Detects price changes and emits price-drop events.
///
/// Batches run one at a time per engine, so ingestion and the favorites
/// scheduler never interleave their writes.
pub struct ReconciliationEngine {
    store: Arc<dyn Store>,
    dispatcher: Arc<NotificationDispatcher>,
    batch: Mutex<()>,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn Store>, dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self {
            store,
            dispatcher,
            batch: Mutex::new(()),
        }
    }

    /// Reconcile a batch in order. A failing item is logged and skipped;
    /// it never aborts the batch.
    pub async fn reconcile(&self, batch: &[Product]) -> ReconcileReport {
        let _guard = self.batch.lock().await;
        let mut report = ReconcileReport {
            received: batch.len(),
            ..ReconcileReport::default()
        };

        for product in batch {
            if let Err(e) = self.reconcile_one(product, &mut report).await {
                report.skipped += 1;
                log::warn(&format!("Skipping product {}: {e}", product.id));
            }
        }

        report
    }

    async fn reconcile_one(&self, incoming: &Product, report: &mut ReconcileReport) -> Result<()> {
        if incoming.id == 0 {
            return Err(AppError::validation("product id must be non-zero"));
        }

        let Some(stored) = self.store.get_product(incoming.id).await? else {
            self.store.save_products(slice::from_ref(incoming)).await?;
            report.inserted += 1;
            log::debug(&format!("New product {}: {}", incoming.id, incoming.name));
            return Ok(());
        };

        let old_price = stored.tracked_price();
        let new_price = incoming.tracked_price();

        if new_price == old_price {
            self.store.save_products(slice::from_ref(incoming)).await?;
            report.unchanged += 1;
            return Ok(());
        }

        let entry = PriceHistoryEntry::observe(incoming, Utc::now());
        self.store.record_price_change(incoming, &entry).await?;
        report.price_changed += 1;
        log::debug(&format!(
            "Product {} price {old_price} -> {new_price}",
            incoming.id
        ));

        if new_price < old_price {
            report.price_drops += 1;
            self.notify_drop(incoming, old_price, report).await?;
        }

        Ok(())
    }

    async fn notify_drop(
        &self,
        product: &Product,
        old_price: f64,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let favorites = self.store.favorites_for(product.id).await?;
        if favorites.is_empty() {
            return Ok(());
        }

        let user_ids = favorites.into_iter().map(|f| f.user_id).collect();
        let event = PriceDropEvent::new(product, old_price, user_ids);

        // The update is already committed; a failed publish is only counted.
        match self.dispatcher.dispatch(&event).await {
            Ok(_) => report.events_published += 1,
            Err(_) => report.publish_failures += 1,
        }
        Ok(())
    }
}
