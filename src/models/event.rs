//! Price-drop events carried over the message bus.

use serde::{Deserialize, Serialize};

use crate::models::{Product, ProductId};

/// A detected decrease of a product's discounted price.
///
/// This is also the bus payload; field names are the wire contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PriceDropEvent {
    pub product_id: ProductId,
    pub product_name: String,
    pub old_price: f64,
    pub new_price: f64,
    pub currency: String,
    pub image_url: String,
    pub user_ids: Vec<String>,
}

impl PriceDropEvent {
    /// Build an event from the new product state and the previous price.
    pub fn new(product: &Product, old_price: f64, user_ids: Vec<String>) -> Self {
        Self {
            product_id: product.id,
            product_name: product.name.clone(),
            old_price,
            new_price: product.tracked_price(),
            currency: product.price.currency.clone(),
            image_url: product.image_url.clone(),
            user_ids,
        }
    }

    /// Human-readable notification text.
    pub fn message_text(&self) -> String {
        format!(
            "Price dropped from {cur}{old:.2} to {cur}{new:.2}",
            cur = self.currency,
            old = self.old_price,
            new = self.new_price
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> PriceDropEvent {
        PriceDropEvent {
            product_id: 1,
            product_name: "Kettle".to_string(),
            old_price: 100.0,
            new_price: 79.5,
            currency: "TRY".to_string(),
            image_url: "https://cdn.example/1.jpg".to_string(),
            user_ids: vec!["u1".to_string(), "u2".to_string()],
        }
    }

    #[test]
    fn test_wire_field_names() {
        let value = serde_json::to_value(sample_event()).unwrap();
        assert_eq!(value["productId"], 1);
        assert_eq!(value["oldPrice"], 100.0);
        assert_eq!(value["userIds"], serde_json::json!(["u1", "u2"]));
        assert_eq!(value["imageUrl"], "https://cdn.example/1.jpg");
    }

    #[test]
    fn test_message_text() {
        assert_eq!(
            sample_event().message_text(),
            "Price dropped from TRY100.00 to TRY79.50"
        );
    }
}
