// src/services/product_pages.rs

//! Product listing and detail page extraction.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{CrawlerConfig, Price, Product, ProductsConfig, Rating, Variant};
use crate::services::pages::parse_selector;
use crate::utils::http::{create_async_client, fetch_page_async};
use crate::utils::{extract_product_id, parse_price, resolve};

/// A product page read into catalog records.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedProduct {
    pub product: Product,
    pub variants: Vec<Variant>,
    pub images: Vec<String>,
}

/// Source of product links and product pages.
#[async_trait]
pub trait ProductPages: Send + Sync {
    /// Product page URLs listed on one listing page.
    async fn product_links(&self, page_url: &str) -> Result<Vec<String>>;

    /// Read one product page.
    async fn product(&self, url: &str) -> Result<ScrapedProduct>;
}

/// Compiled selectors of the `[products]` section.
#[derive(Debug, Clone)]
pub struct ProductSelectors {
    link: Selector,
    name: Selector,
    brand: Selector,
    price: Selector,
    original_price: Selector,
    rating: Selector,
    image: Selector,
    variant: Selector,
}

impl ProductSelectors {
    pub fn new(config: &ProductsConfig) -> Result<Self> {
        Ok(Self {
            link: parse_selector(&config.link_selector)?,
            name: parse_selector(&config.name_selector)?,
            brand: parse_selector(&config.brand_selector)?,
            price: parse_selector(&config.price_selector)?,
            original_price: parse_selector(&config.original_price_selector)?,
            rating: parse_selector(&config.rating_selector)?,
            image: parse_selector(&config.image_selector)?,
            variant: parse_selector(&config.variant_selector)?,
        })
    }
}

/// Reads listing and product pages over HTTP.
pub struct HttpProductPages {
    client: reqwest::Client,
    selectors: ProductSelectors,
    currency: String,
}

impl HttpProductPages {
    pub fn new(crawler: &CrawlerConfig, products: &ProductsConfig) -> Result<Self> {
        Ok(Self {
            client: create_async_client(crawler)?,
            selectors: ProductSelectors::new(products)?,
            currency: products.currency.clone(),
        })
    }
}

#[async_trait]
impl ProductPages for HttpProductPages {
    async fn product_links(&self, page_url: &str) -> Result<Vec<String>> {
        let document = fetch_page_async(&self.client, page_url).await?;
        Ok(extract_product_links(&document, &self.selectors.link, page_url))
    }

    async fn product(&self, url: &str) -> Result<ScrapedProduct> {
        let document = fetch_page_async(&self.client, url).await?;
        extract_product(&document, &self.selectors, url, &self.currency, Utc::now())
    }
}

/// URL of page `page` (1-based) of a category listing.
pub fn listing_page_url(listing_url: &str, page: u32) -> Result<String> {
    let mut url = Url::parse(listing_url)?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "pi")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("pi", &page.to_string());
    Ok(url.to_string())
}

/// Product page URLs from the elements matching `selector`, resolved and
/// deduplicated in page order.
pub fn extract_product_links(document: &Html, selector: &Selector, page_url: &str) -> Vec<String> {
    let Ok(anchor) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    document
        .select(selector)
        .filter_map(|element| {
            if element.value().attr("href").is_some() {
                Some(element)
            } else {
                element.select(&anchor).next()
            }
        })
        .filter_map(|link| link.value().attr("href"))
        .filter_map(|href| resolve(page_url, href))
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Read a product page.
///
/// The id comes from the `-p-<id>` part of the URL. A price from embedded
/// JSON-LD offers wins over the displayed one; a page with neither is
/// rejected so an unreadable price never looks like a drop.
pub fn extract_product(
    document: &Html,
    selectors: &ProductSelectors,
    url: &str,
    currency: &str,
    now: DateTime<Utc>,
) -> Result<ScrapedProduct> {
    let id = extract_product_id(url)
        .ok_or_else(|| AppError::validation(format!("no product id in {url}")))?;

    let price = structured_price(document)
        .or_else(|| first_text(document, &selectors.price).and_then(|t| parse_price(&t)))
        .ok_or_else(|| AppError::validation(format!("no price on {url}")))?;
    let original_price = first_text(document, &selectors.original_price)
        .and_then(|t| parse_price(&t))
        .unwrap_or(price);

    let rating = document
        .select(&selectors.rating)
        .next()
        .and_then(|e| e.value().attr("style"))
        .and_then(rating_from_style)
        .unwrap_or_default();

    let mut seen = HashSet::new();
    let images: Vec<String> = document
        .select(&selectors.image)
        .filter_map(|img| img.value().attr("src").or(img.value().attr("data-src")))
        .filter_map(|src| resolve(url, src))
        .filter(|src| seen.insert(src.clone()))
        .collect();

    let mut names = HashSet::new();
    let variants: Vec<Variant> = document
        .select(&selectors.variant)
        .map(collapsed_text)
        .filter(|name| !name.is_empty() && names.insert(name.clone()))
        .map(|name| {
            let sku = format!("{id}-{name}");
            Variant {
                id: Variant::id_for(&sku),
                product_id: id,
                sku,
                name,
                price,
                stock: 1,
                available: true,
            }
        })
        .collect();

    let product = Product {
        id,
        name: first_text(document, &selectors.name).unwrap_or_default(),
        url: url.to_string(),
        brand: first_text(document, &selectors.brand).unwrap_or_default(),
        brand_id: 0,
        merchant_id: 0,
        category_id: 0,
        image_url: images.first().cloned().unwrap_or_default(),
        rating,
        price: Price {
            selling_price: price,
            discounted_price: price,
            original_price,
            currency: currency.to_string(),
        },
        promotions: Vec::new(),
        social_proof: Vec::new(),
        is_active: true,
        created_at: now,
        updated_at: now,
    };

    Ok(ScrapedProduct {
        product,
        variants,
        images,
    })
}

fn collapsed_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .map(collapsed_text)
        .find(|text| !text.is_empty())
}

/// `offers.price` of the first JSON-LD block that has one.
fn structured_price(document: &Html) -> Option<f64> {
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;
    document.select(&selector).find_map(|script| {
        let value: serde_json::Value = serde_json::from_str(&script.text().collect::<String>()).ok()?;
        let offers = value.get("offers")?;
        let offer = offers.as_array().and_then(|a| a.first()).unwrap_or(offers);
        match offer.get("price")? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    })
}

/// Rating from a star bar style such as `width: 80%` (100% is 5 stars).
fn rating_from_style(style: &str) -> Option<Rating> {
    let width = style
        .split(';')
        .filter_map(|decl| decl.split_once(':'))
        .find(|(prop, _)| prop.trim() == "width")?
        .1
        .trim()
        .trim_end_matches('%')
        .trim()
        .parse::<f64>()
        .ok()?;
    Some(Rating {
        average_rating: (width / 20.0).clamp(0.0, 5.0),
        total_count: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const LISTING: &str = r#"
        <div class="product-card"><a href="/acme/shirt-p-101?boutiqueId=1">Shirt</a></div>
        <div class="product-card"><a href="https://shop.example/acme/dress-p-102">Dress</a></div>
        <div class="product-card"><a href="/acme/shirt-p-101?boutiqueId=1#reviews">Shirt</a></div>
        <div class="product-card">Sold out</div>
    "#;

    const PRODUCT: &str = r#"
        <html><head>
          <script type="application/ld+json">{"@type": "Product", "offers": {"price": "249.90", "priceCurrency": "TRY"}}</script>
        </head><body>
          <h1 class="pr-new-br"><span> Linen   Shirt </span></h1>
          <a class="merchant-text">Acme</a>
          <span class="prc-org">399,90 TL</span>
          <span class="prc-dsc">259,90 TL</span>
          <div class="rating-line" style="width: 80%;"></div>
          <div class="gallery-modal-content">
            <img src="/img/101-1.jpg"><img src="/img/101-2.jpg"><img src="/img/101-1.jpg">
          </div>
          <div class="variant-selector-item">S</div>
          <div class="variant-selector-item"> M </div>
          <div class="variant-selector-item">M</div>
        </body></html>
    "#;

    fn selectors() -> ProductSelectors {
        ProductSelectors::new(&ProductsConfig::default()).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_listing_page_url_sets_page_index() {
        assert_eq!(
            listing_page_url("https://shop.example/kadin-elbise", 2).unwrap(),
            "https://shop.example/kadin-elbise?pi=2"
        );
        assert_eq!(
            listing_page_url("https://shop.example/erkek?sst=PRICE&pi=4", 5).unwrap(),
            "https://shop.example/erkek?sst=PRICE&pi=5"
        );
        assert!(matches!(
            listing_page_url("/relative", 1),
            Err(AppError::Url(_))
        ));
    }

    #[test]
    fn test_extract_product_links() {
        let document = Html::parse_document(LISTING);
        let selector = parse_selector(".product-card").unwrap();
        let links = extract_product_links(&document, &selector, "https://shop.example/kadin?pi=1");

        assert_eq!(
            links,
            vec![
                "https://shop.example/acme/shirt-p-101?boutiqueId=1".to_string(),
                "https://shop.example/acme/dress-p-102".to_string(),
            ]
        );
    }

    #[test]
    fn test_extract_product_page() {
        let document = Html::parse_document(PRODUCT);
        let url = "https://shop.example/acme/linen-shirt-p-101";
        let scraped = extract_product(&document, &selectors(), url, "TRY", now()).unwrap();
        let product = &scraped.product;

        assert_eq!(product.id, 101);
        assert_eq!(product.name, "Linen Shirt");
        assert_eq!(product.brand, "Acme");
        assert_eq!(product.url, url);
        assert_eq!(product.tracked_price(), 249.9);
        assert_eq!(product.price.original_price, 399.9);
        assert_eq!(product.price.currency, "TRY");
        assert_eq!(product.rating.average_rating, 4.0);
        assert_eq!(product.image_url, "https://shop.example/img/101-1.jpg");
        assert_eq!(product.created_at, now());
        assert_eq!(scraped.images.len(), 2);

        let names: Vec<_> = scraped.variants.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["S", "M"]);
        assert!(scraped.variants.iter().all(|v| v.product_id == 101 && v.price == 249.9));
        assert_eq!(scraped.variants[1].sku, "101-M");
        assert_eq!(scraped.variants[1].id, Variant::id_for("101-M"));
    }

    #[test]
    fn test_displayed_price_without_structured_data() {
        let page = PRODUCT.replace("application/ld+json", "text/plain");
        let document = Html::parse_document(&page);
        let scraped = extract_product(
            &document,
            &selectors(),
            "https://shop.example/x-p-7",
            "TRY",
            now(),
        )
        .unwrap();
        assert_eq!(scraped.product.tracked_price(), 259.9);
    }

    #[test]
    fn test_page_without_price_or_id_is_rejected() {
        let document = Html::parse_document("<h1 class='pr-new-br'><span>Ghost</span></h1>");
        assert!(matches!(
            extract_product(&document, &selectors(), "https://shop.example/g-p-9", "TRY", now()),
            Err(AppError::Validation(_))
        ));

        let document = Html::parse_document(PRODUCT);
        assert!(matches!(
            extract_product(&document, &selectors(), "https://shop.example/no-id", "TRY", now()),
            Err(AppError::Validation(_))
        ));
    }
}
