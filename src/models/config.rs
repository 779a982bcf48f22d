//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Category crawl behavior
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Product listing and detail page scraping
    #[serde(default)]
    pub products: ProductsConfig,

    /// Record store location and output mode
    #[serde(default)]
    pub storage: StorageConfig,

    /// Message bus topic settings
    #[serde(default)]
    pub bus: BusConfig,

    /// Favorite re-evaluation timer
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if the file is missing.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::warn!("Config file {:?} not found. Using defaults.", path);
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        let base = url::Url::parse(&self.crawler.base_url)
            .map_err(|e| AppError::validation(format!("crawler.base_url is invalid: {e}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(AppError::validation("crawler.base_url must be http(s)"));
        }
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.root_selector.trim().is_empty()
            || self.crawler.subcategory_selector.trim().is_empty()
        {
            return Err(AppError::validation("crawler selectors must not be empty"));
        }
        if self.products.max_pages == 0 {
            return Err(AppError::validation("products.max_pages must be > 0"));
        }
        if self.products.selectors().iter().any(|s| s.trim().is_empty()) {
            return Err(AppError::validation("product selectors must not be empty"));
        }
        for listing in &self.products.listing_urls {
            let url = url::Url::parse(listing)?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(AppError::validation(format!(
                    "products.listing_urls entry {listing} must be http(s)"
                )));
            }
        }
        if self.bus.topic.trim().is_empty() {
            return Err(AppError::validation("bus.topic is empty"));
        }
        if self.bus.capacity == 0 {
            return Err(AppError::validation("bus.capacity must be > 0"));
        }
        if self.bus.retention < self.bus.capacity {
            return Err(AppError::validation("bus.retention must be >= bus.capacity"));
        }
        if self.scheduler.interval_secs == 0 {
            return Err(AppError::validation("scheduler.interval_secs must be > 0"));
        }
        Ok(())
    }
}

/// Category crawl settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Page the root categories are read from
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Deepest level that is still navigated; depth-1 is the root level
    #[serde(default = "defaults::max_depth")]
    pub max_depth: u32,

    /// Delay before every navigation in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Deadline for a single navigation in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// CSS selector for root category links
    #[serde(default = "defaults::root_selector")]
    pub root_selector: String,

    /// CSS selector for subcategory links
    #[serde(default = "defaults::subcategory_selector")]
    pub subcategory_selector: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            max_depth: defaults::max_depth(),
            request_delay_ms: defaults::request_delay(),
            timeout_secs: defaults::timeout(),
            user_agent: defaults::user_agent(),
            root_selector: defaults::root_selector(),
            subcategory_selector: defaults::subcategory_selector(),
        }
    }
}

/// Product scraping settings.
///
/// Request delay, timeout and User-Agent are shared with `[crawler]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductsConfig {
    /// Listing pages to scrape; empty means the leaf categories of the
    /// last saved crawl
    #[serde(default)]
    pub listing_urls: Vec<String>,

    /// Listing pages read per category at most
    #[serde(default = "defaults::max_pages")]
    pub max_pages: u32,

    /// Currency assigned to scraped prices
    #[serde(default = "defaults::currency")]
    pub currency: String,

    /// Product links on a listing page
    #[serde(default = "defaults::link_selector")]
    pub link_selector: String,

    #[serde(default = "defaults::name_selector")]
    pub name_selector: String,

    #[serde(default = "defaults::brand_selector")]
    pub brand_selector: String,

    /// Current (discounted) price
    #[serde(default = "defaults::price_selector")]
    pub price_selector: String,

    /// Price before discount
    #[serde(default = "defaults::original_price_selector")]
    pub original_price_selector: String,

    /// Element whose `style` width encodes the rating (100% = 5 stars)
    #[serde(default = "defaults::rating_selector")]
    pub rating_selector: String,

    /// Gallery images
    #[serde(default = "defaults::image_selector")]
    pub image_selector: String,

    /// One element per purchasable variant
    #[serde(default = "defaults::variant_selector")]
    pub variant_selector: String,
}

impl ProductsConfig {
    /// Every CSS selector of the section.
    pub fn selectors(&self) -> [&str; 8] {
        [
            self.link_selector.as_str(),
            self.name_selector.as_str(),
            self.brand_selector.as_str(),
            self.price_selector.as_str(),
            self.original_price_selector.as_str(),
            self.rating_selector.as_str(),
            self.image_selector.as_str(),
            self.variant_selector.as_str(),
        ]
    }
}

impl Default for ProductsConfig {
    fn default() -> Self {
        Self {
            listing_urls: Vec::new(),
            max_pages: defaults::max_pages(),
            currency: defaults::currency(),
            link_selector: defaults::link_selector(),
            name_selector: defaults::name_selector(),
            brand_selector: defaults::brand_selector(),
            price_selector: defaults::price_selector(),
            original_price_selector: defaults::original_price_selector(),
            rating_selector: defaults::rating_selector(),
            image_selector: defaults::image_selector(),
            variant_selector: defaults::variant_selector(),
        }
    }
}

/// Where `crawl` writes the category tree. Ingestion always uses the store.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Persisted record store
    #[default]
    Store,
    /// Timestamped flat-file snapshots
    Snapshot,
}

/// Record store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub output_mode: OutputMode,

    /// Directory of the persisted record store
    #[serde(default = "defaults::data_dir")]
    pub data_dir: PathBuf,

    /// Directory for flat-file snapshots
    #[serde(default = "defaults::snapshot_dir")]
    pub snapshot_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_mode: OutputMode::default(),
            data_dir: defaults::data_dir(),
            snapshot_dir: defaults::snapshot_dir(),
        }
    }
}

/// Message bus settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Topic price-drop events are published to
    #[serde(default = "defaults::topic")]
    pub topic: String,

    #[serde(default)]
    pub partition: u32,

    /// Live buffer per subscriber before it starts lagging
    #[serde(default = "defaults::capacity")]
    pub capacity: usize,

    /// Records kept per partition for replay to lagging or resuming readers
    #[serde(default = "defaults::retention")]
    pub retention: usize,

    /// Pause before re-subscribing after the subscription closed
    #[serde(default = "defaults::resubscribe_delay")]
    pub resubscribe_delay_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            topic: defaults::topic(),
            partition: 0,
            capacity: defaults::capacity(),
            retention: defaults::retention(),
            resubscribe_delay_ms: defaults::resubscribe_delay(),
        }
    }
}

/// Favorite priority scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    #[serde(default = "defaults::interval")]
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::enabled(),
            interval_secs: defaults::interval(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::level(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Crawler defaults
    pub fn base_url() -> String {
        "https://www.trendyol.com".into()
    }
    pub fn max_depth() -> u32 {
        3
    }
    pub fn request_delay() -> u64 {
        2000
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; pricewatch/0.1)".into()
    }
    pub fn root_selector() -> String {
        "nav a".into()
    }
    pub fn subcategory_selector() -> String {
        ".sub-category-header".into()
    }

    // Product scraping defaults
    pub fn max_pages() -> u32 {
        50
    }
    pub fn currency() -> String {
        "TRY".into()
    }
    pub fn link_selector() -> String {
        ".product-card a".into()
    }
    pub fn name_selector() -> String {
        ".pr-new-br span".into()
    }
    pub fn brand_selector() -> String {
        ".merchant-text".into()
    }
    pub fn price_selector() -> String {
        ".prc-dsc".into()
    }
    pub fn original_price_selector() -> String {
        ".prc-org".into()
    }
    pub fn rating_selector() -> String {
        ".rating-line".into()
    }
    pub fn image_selector() -> String {
        ".gallery-modal-content img".into()
    }
    pub fn variant_selector() -> String {
        ".variant-selector-item".into()
    }

    // Storage defaults
    pub fn data_dir() -> PathBuf {
        PathBuf::from("data")
    }
    pub fn snapshot_dir() -> PathBuf {
        PathBuf::from("data/snapshots")
    }

    // Bus defaults
    pub fn topic() -> String {
        "price-drops".into()
    }
    pub fn capacity() -> usize {
        1024
    }
    pub fn retention() -> usize {
        100_000
    }
    pub fn resubscribe_delay() -> u64 {
        1000
    }

    // Scheduler defaults
    pub fn enabled() -> bool {
        true
    }
    pub fn interval() -> u64 {
        60
    }

    pub fn level() -> String {
        "info".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.crawler.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_http_base_url() {
        let mut config = Config::default();
        config.crawler.base_url = "ftp://shop.example".to_string();
        assert!(config.validate().is_err());
        config.crawler.base_url = "not a url".to_string();
        assert!(matches!(config.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn validate_rejects_unparseable_listing_url() {
        let mut config = Config::default();
        config.products.listing_urls = vec!["https://shop.example/kadin".to_string()];
        assert!(config.validate().is_ok());

        config.products.listing_urls.push("not a url".to_string());
        assert!(matches!(config.validate(), Err(AppError::Url(_))));
    }

    #[test]
    fn validate_rejects_empty_product_selector() {
        let mut config = Config::default();
        config.products.variant_selector = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_retention_below_capacity() {
        let mut config = Config::default();
        config.bus.capacity = 64;
        config.bus.retention = 16;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.scheduler.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [crawler]
            max_depth = 0

            [storage]
            output_mode = "snapshot"
            "#,
        )
        .unwrap();

        assert_eq!(config.crawler.max_depth, 0);
        assert_eq!(config.crawler.root_selector, "nav a");
        assert_eq!(config.storage.output_mode, OutputMode::Snapshot);
        assert_eq!(config.bus.topic, "price-drops");
        assert_eq!(config.scheduler.interval_secs, 60);
        assert_eq!(config.products.link_selector, ".product-card a");
        assert!(config.products.listing_urls.is_empty());
    }
}
