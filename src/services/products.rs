// src/services/products.rs

//! Paginated product scraper.
//!
//! Walks category listings page by page (`?pi=1`, `?pi=2`, ...) and reads
//! every linked product page. Like the category crawler it is strictly
//! sequential: each navigation waits for the configured delay and is
//! bounded by the request timeout.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::{CrawlerConfig, ProductsConfig};
use crate::services::product_pages::{ProductPages, ScrapedProduct, listing_page_url};
use crate::utils::log;

/// A listing or product page that could not be read.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeFailure {
    pub url: String,
    pub reason: String,
}

/// Products read from a set of listings.
#[derive(Debug, Default)]
pub struct ScrapeReport {
    pub products: Vec<ScrapedProduct>,
    pub listing_pages: usize,
    pub requests: usize,
    pub failed: Vec<ScrapeFailure>,
}

/// Service for scraping products out of category listings.
pub struct ProductScraper {
    pages: Arc<dyn ProductPages>,
    max_pages: u32,
    delay: Duration,
    timeout: Duration,
}

impl ProductScraper {
    pub fn new(
        pages: Arc<dyn ProductPages>,
        crawler: &CrawlerConfig,
        products: &ProductsConfig,
    ) -> Self {
        Self {
            pages,
            max_pages: products.max_pages,
            delay: Duration::from_millis(crawler.request_delay_ms),
            timeout: Duration::from_secs(crawler.timeout_secs),
        }
    }

    /// Scrape every listing in order.
    ///
    /// A product listed in several categories is kept once, at its first
    /// occurrence. Fails only when none of the listings could be read.
    pub async fn scrape(&self, listing_urls: &[String]) -> Result<ScrapeReport> {
        let mut report = ScrapeReport::default();
        let mut seen = HashSet::new();
        let mut readable = 0;

        for listing in listing_urls {
            match self.scrape_listing(listing, &mut seen, &mut report).await {
                Ok(()) => readable += 1,
                Err(e) => {
                    log::warn(&format!("Skipping listing {listing}: {e}"));
                    report.failed.push(ScrapeFailure {
                        url: listing.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if readable == 0 && !listing_urls.is_empty() {
            return Err(AppError::crawl(
                "product listings",
                format!("none of {} listings could be read", listing_urls.len()),
            ));
        }
        Ok(report)
    }

    /// Read one listing until a page brings no new product links or the
    /// page limit is reached.
    ///
    /// An unreadable first page fails the listing; a later one only ends
    /// pagination. Unreadable product pages are recorded and skipped.
    async fn scrape_listing(
        &self,
        listing_url: &str,
        seen: &mut HashSet<String>,
        report: &mut ScrapeReport,
    ) -> Result<()> {
        for page in 1..=self.max_pages {
            let page_url = listing_page_url(listing_url, page)?;

            report.requests += 1;
            let links = match self
                .navigate(&page_url, self.pages.product_links(&page_url))
                .await
            {
                Ok(links) => links,
                Err(e) if page == 1 => return Err(e),
                Err(e) => {
                    log::warn(&format!("Stopping at {page_url}: {e}"));
                    report.failed.push(ScrapeFailure {
                        url: page_url,
                        reason: e.to_string(),
                    });
                    break;
                }
            };
            report.listing_pages += 1;

            let fresh: Vec<String> = links
                .into_iter()
                .filter(|link| seen.insert(link.clone()))
                .collect();
            if fresh.is_empty() {
                break;
            }
            log::debug(&format!("{page_url}: {} product links", fresh.len()));

            for link in fresh {
                report.requests += 1;
                match self.navigate(&link, self.pages.product(&link)).await {
                    Ok(scraped) => {
                        if report
                            .products
                            .iter()
                            .any(|p| p.product.id == scraped.product.id)
                        {
                            continue;
                        }
                        report.products.push(scraped);
                    }
                    Err(e) => {
                        log::warn(&format!("Failed to read product {link}: {e}"));
                        report.failed.push(ScrapeFailure {
                            url: link,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    async fn navigate<T>(&self, url: &str, fetch: impl Future<Output = Result<T>>) -> Result<T> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        tokio::time::timeout(self.timeout, fetch)
            .await
            .map_err(|_| AppError::Timeout {
                url: url.to_string(),
                secs: self.timeout.as_secs(),
            })?
    }
}
