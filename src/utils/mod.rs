//! Utility functions and helpers.

pub mod http;
pub mod log;
pub mod time;
pub mod url;

pub use self::url::resolve;

use crate::models::ProductId;

/// Extract the product id from a product page URL (`...-p-12345`).
pub fn extract_product_id(url: &str) -> Option<ProductId> {
    let pattern = regex::Regex::new(r"-p-(\d+)").ok()?;
    pattern
        .captures_iter(url)
        .last()
        .and_then(|caps| caps.get(1))
        .and_then(|id| id.as_str().parse().ok())
        .filter(|&id| id != 0)
}

/// Parse a displayed price such as `1.299,90 TL` or `89,99`.
///
/// Dots group thousands and a comma separates decimals; text without a
/// comma is read with a dot as decimal separator when the dot is followed
/// by one or two digits only.
pub fn parse_price(text: &str) -> Option<f64> {
    let pattern = regex::Regex::new(r"\d[\d.,]*").ok()?;
    let raw = pattern.find(text)?.as_str().trim_end_matches(['.', ',']);

    let normalized = if raw.contains(',') {
        raw.replace('.', "").replace(',', ".")
    } else {
        match raw.rsplit_once('.') {
            Some((_, decimals)) if decimals.len() <= 2 && raw.matches('.').count() == 1 => {
                raw.to_string()
            }
            _ => raw.replace('.', ""),
        }
    };
    normalized.parse().ok()
}
