//! Service layer for the price tracker.
//!
//! This module contains the collaborators the pipeline is wired from:
//! - Category link extraction (`CategoryPages`, `HttpCategoryPages`)
//! - Category tree crawling (`CategoryCrawler`)
//! - Product page extraction (`ProductPages`, `HttpProductPages`)
//! - Paginated product scraping (`ProductScraper`)
//! - Price-drop publishing (`NotificationDispatcher`)
//! - Notification audit consumption (`NotificationConsumer`)

mod categories;
mod consumer;
mod dispatcher;
mod pages;
mod product_pages;
mod products;

pub use categories::{CategoryCrawler, CrawlFailure, CrawlReport};
pub use consumer::{ConsumerStats, NotificationConsumer};
pub use dispatcher::NotificationDispatcher;
pub use pages::{CategoryPages, HttpCategoryPages, extract_links};
pub use product_pages::{
    HttpProductPages, ProductPages, ProductSelectors, ScrapedProduct, extract_product,
    extract_product_links, listing_page_url,
};
pub use products::{ProductScraper, ScrapeFailure, ScrapeReport};
