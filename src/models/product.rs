//! Catalog product records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::utils::time::{UNSET, lenient_utc, lenient_utc_opt};

/// Stable external product identifier.
pub type ProductId = u64;

/// A fully-populated catalog product.
///
/// Field names follow the catalog feed so snapshots round-trip unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub brand: String,

    #[serde(default)]
    pub brand_id: u64,

    #[serde(default)]
    pub merchant_id: u64,

    #[serde(default)]
    pub category_id: u64,

    #[serde(default, rename = "image")]
    pub image_url: String,

    #[serde(default, rename = "ratingScore")]
    pub rating: Rating,

    pub price: Price,

    #[serde(default)]
    pub promotions: Vec<Promotion>,

    #[serde(default)]
    pub social_proof: Vec<SocialProof>,

    #[serde(default = "default_active")]
    pub is_active: bool,

    #[serde(default = "unset", deserialize_with = "lenient_utc")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "unset", deserialize_with = "lenient_utc")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Current discounted price, the value price changes are tracked on.
    pub fn tracked_price(&self) -> f64 {
        self.price.discounted_price
    }

    /// Fill in timestamps the feed left empty.
    ///
    /// A missing creation time becomes `now`; a missing update time falls
    /// back to the creation time.
    pub fn normalize_timestamps(&mut self, now: DateTime<Utc>) {
        if self.created_at == UNSET {
            self.created_at = now;
        }
        if self.updated_at == UNSET {
            self.updated_at = self.created_at;
        }
    }
}

fn default_active() -> bool {
    true
}

fn unset() -> DateTime<Utc> {
    UNSET
}

/// Aggregated customer rating.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    #[serde(default)]
    pub average_rating: f64,
    #[serde(default)]
    pub total_count: u32,
}

/// Price block of a product.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Price {
    #[serde(default)]
    pub selling_price: f64,
    #[serde(default)]
    pub discounted_price: f64,
    #[serde(default)]
    pub original_price: f64,
    #[serde(default)]
    pub currency: String,
}

/// A promotion attached to a product.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Promotion {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub discount_type: i32,
    #[serde(default, deserialize_with = "lenient_utc_opt")]
    pub promotion_end_date: Option<DateTime<Utc>>,
}

/// A social-proof tag such as "sold in the last 24h".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SocialProof {
    pub key: String,
    pub value: String,
}

/// A purchasable variant of a product.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Variant {
    pub id: u64,
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub price: f64,
    pub stock: u32,
    pub available: bool,
}

impl Variant {
    /// Stable variant id derived from its SKU.
    pub fn id_for(sku: &str) -> u64 {
        let digest = Sha256::digest(sku.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        // Top bit cleared so ids fit in an i64.
        u64::from_be_bytes(bytes) >> 1
    }
}

/// One observed price of a product. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PriceHistoryEntry {
    pub product_id: ProductId,
    pub price: f64,
    pub recorded_at: DateTime<Utc>,
}

impl PriceHistoryEntry {
    /// Record the current tracked price of a product.
    pub fn observe(product: &Product, recorded_at: DateTime<Utc>) -> Self {
        Self {
            product_id: product.id,
            price: product.tracked_price(),
            recorded_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_deserialize_feed_record() {
        let json = r#"{
            "id": 42,
            "name": "Linen Shirt",
            "brand": "Acme",
            "categoryId": 7,
            "image": "/img/42.jpg",
            "ratingScore": {"averageRating": 4.5, "totalCount": 12},
            "price": {"sellingPrice": 120.0, "discountedPrice": 99.9, "originalPrice": 150.0, "currency": "TRY"},
            "promotions": [{"id": 1, "name": "Spring", "discountType": 2, "promotionEndDate": "2024-05-01T00:00:00"}],
            "socialProof": [{"key": "orderCount", "value": "1K+"}],
            "createdAt": "2024-04-01T10:00:00"
        }"#;

        let product: Product = serde_json::from_str(json).unwrap();
        assert_eq!(product.id, 42);
        assert_eq!(product.image_url, "/img/42.jpg");
        assert_eq!(product.rating.total_count, 12);
        assert_eq!(product.tracked_price(), 99.9);
        assert!(product.is_active);
        assert_eq!(
            product.promotions[0].promotion_end_date,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(product.updated_at, UNSET);
    }

    #[test]
    fn test_normalize_timestamps() {
        let json = r#"{"id": 1, "price": {"discountedPrice": 10.0}}"#;
        let mut product: Product = serde_json::from_str(json).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap();

        product.normalize_timestamps(now);
        assert_eq!(product.created_at, now);
        assert_eq!(product.updated_at, now);
    }

    #[test]
    fn test_variant_ids_follow_sku() {
        assert_eq!(Variant::id_for("42-M"), Variant::id_for("42-M"));
        assert_ne!(Variant::id_for("42-M"), Variant::id_for("42-L"));
        assert!(Variant::id_for("42-M") <= i64::MAX as u64);
    }

    #[test]
    fn test_serialized_product_reads_back() {
        let json = r#"{"id": 3, "price": {"discountedPrice": 5.5, "currency": "EUR"}, "createdAt": "2024-01-02T03:04:05Z", "updatedAt": "2024-01-03T03:04:05Z"}"#;
        let product: Product = serde_json::from_str(json).unwrap();
        let again: Product = serde_json::from_str(&serde_json::to_string(&product).unwrap()).unwrap();
        assert_eq!(product, again);
    }
}
