// src/services/categories.rs

//! Bounded recursive category crawler.
//!
//! Discovers a category tree starting from the root page. Traversal is
//! depth-first and strictly sequential: one navigation at a time, each
//! preceded by the configured delay and bounded by the request timeout.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};
use crate::models::{CategoryId, CategoryLink, CategoryTree, CrawlerConfig};
use crate::services::CategoryPages;
use crate::utils::log;

/// A category page that could not be read.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlFailure {
    pub category_id: CategoryId,
    pub url: String,
    pub reason: String,
}

/// Outcome of one crawl run. The tree is kept even when some pages failed.
#[derive(Debug)]
pub struct CrawlReport {
    pub tree: CategoryTree,
    pub requests: usize,
    pub failed: Vec<CrawlFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Service for crawling the category hierarchy.
pub struct CategoryCrawler {
    pages: Arc<dyn CategoryPages>,
    base_url: String,
    max_depth: u32,
    delay: Duration,
    timeout: Duration,
}

impl CategoryCrawler {
    pub fn new(pages: Arc<dyn CategoryPages>, config: &CrawlerConfig) -> Self {
        Self {
            pages,
            base_url: config.base_url.clone(),
            max_depth: config.max_depth,
            delay: Duration::from_millis(config.request_delay_ms),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Crawl the whole tree.
    ///
    /// Fails only when the root page cannot be read; every other failure is
    /// local to its node and recorded in the report.
    pub async fn crawl(&self) -> Result<CrawlReport> {
        let started_at = Utc::now();
        let mut requests = 0;

        requests += 1;
        let roots = self
            .navigate(&self.base_url, true)
            .await
            .map_err(|e| AppError::crawl(&self.base_url, e))?;

        let mut tree = CategoryTree::new();
        let root_ids: Vec<_> = roots
            .into_iter()
            .filter_map(|link| tree.insert_root(link))
            .collect();
        log::info(&format!("Found {} root categories", root_ids.len()));

        let mut failed = Vec::new();

        // Explicit stack in reverse order gives the same pre-order as
        // recursing into each child in turn.
        let mut stack: Vec<CategoryId> = root_ids.into_iter().rev().collect();
        while let Some(id) = stack.pop() {
            let Some((url, depth)) = tree.get(&id).map(|c| (c.url.clone(), c.depth)) else {
                continue;
            };

            if depth > self.max_depth {
                tree.mark_leaf(&id);
                continue;
            }

            requests += 1;
            let candidates = match self.navigate(&url, false).await {
                Ok(candidates) => candidates,
                Err(e) => {
                    log::warn(&format!("Failed to read category {url}: {e}"));
                    failed.push(CrawlFailure {
                        category_id: id,
                        url,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let children: Vec<_> = candidates
                .into_iter()
                .filter_map(|link| tree.insert_child(&id, link))
                .collect();

            if children.is_empty() {
                tree.mark_leaf(&id);
                continue;
            }

            log::debug(&format!(
                "{url}: {} subcategories at depth {}",
                children.len(),
                depth + 1
            ));
            stack.extend(children.into_iter().rev());
        }

        Ok(CrawlReport {
            tree,
            requests,
            failed,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn navigate(&self, url: &str, root: bool) -> Result<Vec<CategoryLink>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let fetch = if root {
            self.pages.root_candidates(url)
        } else {
            self.pages.subcategories(url)
        };

        tokio::time::timeout(self.timeout, fetch)
            .await
            .map_err(|_| AppError::Timeout {
                url: url.to_string(),
                secs: self.timeout.as_secs(),
            })?
    }
}
