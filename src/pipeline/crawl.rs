// src/pipeline/crawl.rs

//! Category crawling pipeline.

use std::sync::Arc;

use crate::error::Result;
use crate::models::Config;
use crate::services::{CategoryCrawler, CategoryPages, CrawlReport};
use crate::storage::StorageHandler;
use crate::utils::log;

/// Crawl the category tree and save it.
pub async fn run_crawl(
    config: &Config,
    pages: Arc<dyn CategoryPages>,
    storage: &dyn StorageHandler,
) -> Result<CrawlReport> {
    log::header("Category crawl");
    log::info(&format!(
        "Crawling {} (max depth {}, {}ms between requests)",
        config.crawler.base_url, config.crawler.max_depth, config.crawler.request_delay_ms
    ));

    let crawler = CategoryCrawler::new(pages, &config.crawler);
    let report = crawler.crawl().await?;

    storage.save_categories(&report.tree).await?;
    log::success(&format!("Saved {} categories", report.tree.len()));

    for failure in &report.failed {
        log::sub_item(&format!("Failed: {} ({})", failure.url, failure.reason));
    }

    let elapsed = report.finished_at - report.started_at;
    log::summary(
        "Crawl",
        &[
            ("Categories", report.tree.len().to_string()),
            ("Roots", report.tree.roots().len().to_string()),
            ("Leaves", report.tree.leaf_count().to_string()),
            ("Deepest level", report.tree.max_depth().to_string()),
            ("Requests", report.requests.to_string()),
            ("Failed pages", report.failed.len().to_string()),
            ("Duration", format!("{:.1}s", elapsed.num_milliseconds() as f64 / 1000.0)),
        ],
    );

    Ok(report)
}
