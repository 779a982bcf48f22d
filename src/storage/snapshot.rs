//! Flat-file snapshot output.
//!
//! Each save writes a new timestamped file instead of updating state:
//!
//! ```text
//! {snapshot_dir}/
//! ├── categories_2024-06-01_10-00-00_000.json
//! ├── products_2024-06-01_10-00-05_120.json
//! ├── variants_...json
//! └── images_...json
//! ```
//!
//! Product lookups read the newest products snapshot.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;

use crate::error::Result;
use crate::models::{CategoryTree, Product, ProductId, Variant};
use crate::storage::StorageHandler;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S_%3f";

/// Snapshot writer implementing the save/get contract.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    output_dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    async fn write_snapshot<T: Serialize + ?Sized>(&self, kind: &str, value: &T) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let timestamp = Utc::now().format(TIMESTAMP_FORMAT).to_string();
        let path = self.output_dir.join(format!("{kind}_{timestamp}.json"));
        let bytes = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(&path, bytes).await?;
        log::debug!("Wrote snapshot {}", path.display());
        Ok(path)
    }

    /// Newest snapshot file of a kind, if any.
    pub async fn latest(&self, kind: &str) -> Result<Option<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(&self.output_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let prefix = format!("{kind}_");
        let mut newest: Option<PathBuf> = None;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(&prefix) || !name.ends_with(".json") {
                continue;
            }
            if newest.as_ref().is_none_or(|current| path > *current) {
                newest = Some(path);
            }
        }
        Ok(newest)
    }
}

#[async_trait]
impl StorageHandler for SnapshotStore {
    async fn save_categories(&self, tree: &CategoryTree) -> Result<()> {
        self.write_snapshot("categories", tree).await.map(|_| ())
    }

    async fn save_products(&self, products: &[Product]) -> Result<()> {
        self.write_snapshot("products", products).await.map(|_| ())
    }

    async fn save_variants(&self, variants: &[Variant]) -> Result<()> {
        self.write_snapshot("variants", variants).await.map(|_| ())
    }

    async fn save_images(&self, urls: &[String]) -> Result<()> {
        self.write_snapshot("images", urls).await.map(|_| ())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let Some(path) = self.latest("products").await? else {
            return Ok(None);
        };
        let bytes = tokio::fs::read(&path).await?;
        let products: Vec<Product> = serde_json::from_slice(&bytes)?;
        Ok(products.into_iter().find(|p| p.id == id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CategoryLink;
    use tempfile::TempDir;

    fn product(id: ProductId, price: f64) -> Product {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "price": {"discountedPrice": price, "currency": "TRY"}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_product_reads_newest_snapshot() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::new(tmp.path());

        assert!(store.get_product(1).await.unwrap().is_none());

        store.save_products(&[product(1, 50.0)]).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.save_products(&[product(1, 45.0)]).await.unwrap();

        let found = store.get_product(1).await.unwrap().unwrap();
        assert_eq!(found.tracked_price(), 45.0);
        assert!(store.get_product(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_categories_snapshot_written() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::new(tmp.path().join("out"));
        let mut tree = CategoryTree::new();
        tree.insert_root(CategoryLink::new("Toys", "https://shop.example/toys"));

        store.save_categories(&tree).await.unwrap();

        let latest = store.latest("categories").await.unwrap().unwrap();
        let bytes = std::fs::read(latest).unwrap();
        let loaded: CategoryTree = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(store.latest("products").await.unwrap().is_none());
    }
}
