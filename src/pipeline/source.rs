// src/pipeline/source.rs

//! Catalog sources feeding the reconciliation engine.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::Result;
use crate::models::{CategoryTree, Product, ProductsConfig, Variant};
use crate::services::ProductScraper;
use crate::utils::log;

/// Products of one batch together with the records read alongside them.
#[derive(Debug, Clone, Default)]
pub struct CatalogBatch {
    pub products: Vec<Product>,
    pub variants: Vec<Variant>,
    pub images: Vec<String>,
}

/// Yields an ordered, finite batch of fully-populated products.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn products(&self) -> Result<Vec<Product>>;

    /// The batch with variants and gallery images, for sources that have them.
    async fn batch(&self) -> Result<CatalogBatch> {
        Ok(CatalogBatch {
            products: self.products().await?,
            ..CatalogBatch::default()
        })
    }
}

#[derive(Deserialize)]
struct Envelope {
    data: Contents,
}

#[derive(Deserialize)]
struct Contents {
    #[serde(default)]
    contents: Vec<Product>,
}

/// Catalog snapshot file in the feed layout `{"data": {"contents": [...]}}`.
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    path: PathBuf,
}

impl SnapshotSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse a snapshot body.
    ///
    /// Records with id 0 are dropped; missing timestamps are filled from
    /// `now`.
    pub fn parse(bytes: &[u8], now: DateTime<Utc>) -> Result<Vec<Product>> {
        let envelope: Envelope = serde_json::from_slice(bytes)?;
        let total = envelope.data.contents.len();

        let products: Vec<Product> = envelope
            .data
            .contents
            .into_iter()
            .filter(|p| p.id != 0)
            .map(|mut p| {
                p.normalize_timestamps(now);
                p
            })
            .collect();

        if products.len() < total {
            log::warn(&format!(
                "Dropped {} snapshot records without a product id",
                total - products.len()
            ));
        }
        Ok(products)
    }
}

#[async_trait]
impl CatalogSource for SnapshotSource {
    async fn products(&self) -> Result<Vec<Product>> {
        let bytes = tokio::fs::read(&self.path).await?;
        let products = Self::parse(&bytes, Utc::now())?;
        log::debug(&format!(
            "Read {} products from {}",
            products.len(),
            self.path.display()
        ));
        Ok(products)
    }
}

/// Catalog read live from the shop's category listings.
pub struct LiveCatalogSource {
    scraper: ProductScraper,
    listing_urls: Vec<String>,
}

impl LiveCatalogSource {
    pub fn new(scraper: ProductScraper, listing_urls: Vec<String>) -> Self {
        Self {
            scraper,
            listing_urls,
        }
    }

    /// Listings to scrape: the configured ones, or else every leaf of the
    /// crawled category tree.
    pub fn listings(config: &ProductsConfig, tree: &CategoryTree) -> Vec<String> {
        if !config.listing_urls.is_empty() {
            return config.listing_urls.clone();
        }
        tree.depth_first()
            .into_iter()
            .filter(|c| c.is_leaf)
            .map(|c| c.url.clone())
            .collect()
    }

    pub fn listing_urls(&self) -> &[String] {
        &self.listing_urls
    }
}

#[async_trait]
impl CatalogSource for LiveCatalogSource {
    async fn products(&self) -> Result<Vec<Product>> {
        Ok(self.batch().await?.products)
    }

    async fn batch(&self) -> Result<CatalogBatch> {
        let report = self.scraper.scrape(&self.listing_urls).await?;
        log::info(&format!(
            "Scraped {} products from {} listing pages ({} requests, {} failed)",
            report.products.len(),
            report.listing_pages,
            report.requests,
            report.failed.len()
        ));

        let mut batch = CatalogBatch::default();
        for scraped in report.products {
            batch.products.push(scraped.product);
            batch.variants.extend(scraped.variants);
            batch.images.extend(scraped.images);
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::TimeZone;
    use tempfile::TempDir;

    use crate::models::{CategoryLink, CrawlerConfig};
    use crate::services::{ProductPages, ScrapedProduct};

    const SNAPSHOT: &str = r#"{
        "data": {
            "contents": [
                {
                    "id": 101,
                    "name": "Kettle",
                    "price": {"sellingPrice": 120.0, "discountedPrice": 99.9, "currency": "TRY"},
                    "createdAt": "2024-03-01T10:15:00",
                    "promotions": [{"id": 5, "name": "Spring", "promotionEndDate": "2024-03-31 23:59:59"}]
                },
                {"id": 0, "name": "Broken", "price": {"discountedPrice": 1.0}},
                {
                    "id": 102,
                    "name": "Toaster",
                    "price": {"discountedPrice": 45.0, "currency": "TRY"},
                    "createdAt": "2024-03-01T10:15:00+03:00",
                    "updatedAt": "2024-03-02T08:00:00Z"
                }
            ]
        }
    }"#;

    #[test]
    fn test_parse_reads_zone_less_timestamps_as_utc() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let products = SnapshotSource::parse(SNAPSHOT.as_bytes(), now).unwrap();

        assert_eq!(products.len(), 2);
        let kettle = &products[0];
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 0).unwrap();
        assert_eq!(kettle.created_at, created);
        assert_eq!(kettle.updated_at, created);
        assert_eq!(
            kettle.promotions[0].promotion_end_date,
            Some(Utc.with_ymd_and_hms(2024, 3, 31, 23, 59, 59).unwrap())
        );

        let toaster = &products[1];
        assert_eq!(
            toaster.created_at,
            Utc.with_ymd_and_hms(2024, 3, 1, 7, 15, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_fills_missing_timestamps() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let body = r#"{"data": {"contents": [{"id": 1, "price": {"discountedPrice": 5.0}}]}}"#;
        let products = SnapshotSource::parse(body.as_bytes(), now).unwrap();
        assert_eq!(products[0].created_at, now);
        assert_eq!(products[0].updated_at, now);
    }

    #[test]
    fn test_parse_rejects_wrong_layout() {
        assert!(SnapshotSource::parse(b"[]", Utc::now()).is_err());
    }

    #[tokio::test]
    async fn test_products_reads_file_in_order() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("catalog.json");
        std::fs::write(&path, SNAPSHOT).unwrap();

        let ids: Vec<_> = SnapshotSource::new(&path)
            .products()
            .await
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![101, 102]);
    }

    #[test]
    fn test_listings_prefer_configured_urls() {
        let mut tree = CategoryTree::new();
        let root = tree
            .insert_root(CategoryLink::new("Women", "https://shop.example/kadin"))
            .unwrap();
        let dresses = tree
            .insert_child(&root, CategoryLink::new("Dresses", "https://shop.example/elbise"))
            .unwrap();
        tree.mark_leaf(&dresses);

        let mut config = ProductsConfig::default();
        assert_eq!(
            LiveCatalogSource::listings(&config, &tree),
            vec!["https://shop.example/elbise".to_string()]
        );

        config.listing_urls = vec!["https://shop.example/sale".to_string()];
        assert_eq!(
            LiveCatalogSource::listings(&config, &tree),
            vec!["https://shop.example/sale".to_string()]
        );
    }

    struct OneProductShop;

    #[async_trait]
    impl ProductPages for OneProductShop {
        async fn product_links(&self, page_url: &str) -> Result<Vec<String>> {
            Ok(if page_url.ends_with("pi=1") {
                vec!["https://shop.example/shirt-p-7".to_string()]
            } else {
                Vec::new()
            })
        }

        async fn product(&self, url: &str) -> Result<ScrapedProduct> {
            let body = format!(r#"{{"data": {{"contents": [{{"id": 7, "url": "{url}", "price": {{"discountedPrice": 50.0}}}}]}}}}"#);
            let product = SnapshotSource::parse(body.as_bytes(), Utc::now())?.remove(0);
            let variant = Variant {
                id: Variant::id_for("7-M"),
                product_id: 7,
                sku: "7-M".to_string(),
                name: "M".to_string(),
                price: 50.0,
                stock: 1,
                available: true,
            };
            Ok(ScrapedProduct {
                product,
                variants: vec![variant],
                images: vec!["https://cdn.example/7.jpg".to_string()],
            })
        }
    }

    #[tokio::test]
    async fn test_live_batch_carries_variants_and_images() {
        let crawler = CrawlerConfig {
            request_delay_ms: 0,
            ..CrawlerConfig::default()
        };
        let scraper = ProductScraper::new(
            Arc::new(OneProductShop),
            &crawler,
            &ProductsConfig::default(),
        );
        let source =
            LiveCatalogSource::new(scraper, vec!["https://shop.example/kadin".to_string()]);

        let batch = source.batch().await.unwrap();
        assert_eq!(batch.products.len(), 1);
        assert_eq!(batch.variants[0].sku, "7-M");
        assert_eq!(batch.images, vec!["https://cdn.example/7.jpg".to_string()]);
    }
}
