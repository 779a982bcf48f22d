// src/pipeline/ingest.rs

//! One-shot catalog ingestion.

use std::collections::HashSet;

use crate::error::Result;
use crate::models::Product;
use crate::pipeline::reconcile::{ReconcileReport, ReconciliationEngine};
use crate::pipeline::source::CatalogSource;
use crate::storage::StorageHandler;
use crate::utils::log;

/// Read a batch from `source` and reconcile it.
///
/// Variants and image URLs of the batch are recorded afterwards; failing to
/// record them does not fail the ingest.
pub async fn run_ingest(
    source: &dyn CatalogSource,
    engine: &ReconciliationEngine,
    storage: &dyn StorageHandler,
) -> Result<ReconcileReport> {
    let batch = source.batch().await?;
    log::info(&format!(
        "Loaded {} products ({} variants)",
        batch.products.len(),
        batch.variants.len()
    ));

    let report = engine.reconcile(&batch.products).await;

    if !batch.variants.is_empty() {
        if let Err(e) = storage.save_variants(&batch.variants).await {
            log::warn(&format!(
                "Failed to record {} variants: {e}",
                batch.variants.len()
            ));
        }
    }

    let images = image_urls(&batch.products, &batch.images);
    if !images.is_empty() {
        if let Err(e) = storage.save_images(&images).await {
            log::warn(&format!("Failed to record {} image URLs: {e}", images.len()));
        }
    }

    report.log_summary("Ingest");
    Ok(report)
}

/// Distinct non-empty image URLs, product images first, in batch order.
fn image_urls<'a>(products: &'a [Product], gallery: &'a [String]) -> Vec<String> {
    let mut seen = HashSet::new();
    products
        .iter()
        .map(|p| p.image_url.trim())
        .chain(gallery.iter().map(|url| url.trim()))
        .filter(|url| !url.is_empty() && seen.insert(*url))
        .map(str::to_string)
        .collect()
}
