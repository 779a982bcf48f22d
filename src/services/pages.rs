// src/services/pages.rs

//! Category link extraction.
//!
//! The crawler only needs "a list of category links" from a page; how the
//! page is fetched and read sits behind [`CategoryPages`].

use std::collections::HashSet;

use async_trait::async_trait;
use scraper::{Html, Selector};

use crate::error::{AppError, Result};
use crate::models::{CategoryLink, CrawlerConfig};
use crate::utils::http::{create_async_client, fetch_page_async};
use crate::utils::resolve;

/// Source of category candidates for a page.
#[async_trait]
pub trait CategoryPages: Send + Sync {
    /// Top-level categories listed on the root page.
    async fn root_candidates(&self, url: &str) -> Result<Vec<CategoryLink>>;

    /// Subcategories listed on a category page.
    async fn subcategories(&self, url: &str) -> Result<Vec<CategoryLink>>;
}

/// Extracts category links from fetched HTML with CSS selectors.
pub struct HttpCategoryPages {
    client: reqwest::Client,
    root_selector: Selector,
    subcategory_selector: Selector,
}

impl HttpCategoryPages {
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        Ok(Self {
            client: create_async_client(config)?,
            root_selector: parse_selector(&config.root_selector)?,
            subcategory_selector: parse_selector(&config.subcategory_selector)?,
        })
    }
}

#[async_trait]
impl CategoryPages for HttpCategoryPages {
    async fn root_candidates(&self, url: &str) -> Result<Vec<CategoryLink>> {
        let document = fetch_page_async(&self.client, url).await?;
        Ok(extract_links(&document, &self.root_selector, url))
    }

    async fn subcategories(&self, url: &str) -> Result<Vec<CategoryLink>> {
        let document = fetch_page_async(&self.client, url).await?;
        Ok(extract_links(&document, &self.subcategory_selector, url))
    }
}

pub(crate) fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// Collect `{name, url}` pairs from the elements matching `selector`.
///
/// An element that is not itself a link contributes its first descendant
/// `a[href]`. Names are whitespace-collapsed, hrefs are resolved against
/// `page_url`, and the first occurrence of a URL wins.
pub fn extract_links(document: &Html, selector: &Selector, page_url: &str) -> Vec<CategoryLink> {
    let Ok(anchor) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(selector) {
        let link_elem = if element.value().attr("href").is_some() {
            Some(element)
        } else {
            element.select(&anchor).next()
        };
        let Some(link_elem) = link_elem else {
            continue;
        };

        let name = element
            .text()
            .flat_map(str::split_whitespace)
            .collect::<Vec<_>>()
            .join(" ");
        if name.is_empty() {
            continue;
        }

        let Some(url) = link_elem
            .value()
            .attr("href")
            .and_then(|href| resolve(page_url, href))
        else {
            continue;
        };

        if seen.insert(url.clone()) {
            links.push(CategoryLink::new(name, url));
        }
    }

    links
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <nav>
          <a href="/kadin">  Kadın </a>
          <a href="https://shop.example/erkek">Erkek</a>
          <a href="/kadin#top">Kadın again</a>
          <a href="javascript:void(0)">Menu</a>
          <a href="/empty">   </a>
        </nav>
        <div class="sub-category-header"><span>Elbise</span><a href="elbise">x</a></div>
        <div class="sub-category-header">No link here</div>
    "#;

    #[test]
    fn test_extract_links_resolves_and_dedupes() {
        let document = Html::parse_document(PAGE);
        let selector = parse_selector("nav a").unwrap();
        let links = extract_links(&document, &selector, "https://shop.example/");

        assert_eq!(
            links,
            vec![
                CategoryLink::new("Kadın", "https://shop.example/kadin"),
                CategoryLink::new("Erkek", "https://shop.example/erkek"),
            ]
        );
    }

    #[test]
    fn test_extract_links_from_container_elements() {
        let document = Html::parse_document(PAGE);
        let selector = parse_selector(".sub-category-header").unwrap();
        let links = extract_links(&document, &selector, "https://shop.example/kadin/");

        assert_eq!(links.len(), 1);
        assert_eq!(links[0].name, "Elbise x");
        assert_eq!(links[0].url, "https://shop.example/kadin/elbise");
    }

    #[test]
    fn test_parse_selector_invalid() {
        assert!(matches!(
            parse_selector("[[invalid"),
            Err(AppError::Selector { .. })
        ));
    }
}
