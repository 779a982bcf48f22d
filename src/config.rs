// src/config.rs

//! Configuration loading utilities.

use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::{Config, OutputMode};
use crate::services::{HttpCategoryPages, ProductSelectors};
use crate::utils::log;

/// Default config file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "pricewatch.toml";

/// Load and validate the configuration at `path`.
///
/// A missing file yields the defaults. A file that exists but does not
/// parse or does not validate is an error; callers treat it as fatal.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = Config::load_or_default(path).map_err(|e| {
        AppError::config(format!("Failed to load config from {}: {e}", path.display()))
    })?;
    config.validate()?;
    log::debug(&format!("Configuration loaded from {}", path.display()));
    Ok(config)
}

/// Validation that needs more than the raw values: the crawler and product
/// selectors must compile.
pub fn check_runtime(config: &Config) -> Result<()> {
    HttpCategoryPages::new(&config.crawler)?;
    ProductSelectors::new(&config.products)?;
    Ok(())
}

/// Note for commands that always write to the record store.
///
/// `storage.output_mode = "snapshot"` only applies to `crawl`; ingestion
/// needs stored state to diff against.
pub fn output_mode_note(config: &Config, command: &str) -> Option<String> {
    match config.storage.output_mode {
        OutputMode::Store => None,
        OutputMode::Snapshot => Some(format!(
            "storage.output_mode = \"snapshot\" only applies to crawl; {command} writes to {}",
            config.storage.data_dir.display()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.bus.topic, "price-drops");
    }

    #[test]
    fn test_unparseable_file_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pricewatch.toml");
        std::fs::write(&path, "[crawler\nmax_depth = ").unwrap();
        assert!(matches!(load_config(&path), Err(AppError::Config(_))));
    }

    #[test]
    fn test_invalid_values_are_fatal() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pricewatch.toml");
        std::fs::write(&path, "[scheduler]\ninterval_secs = 0\n").unwrap();
        assert!(matches!(load_config(&path), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_check_runtime_rejects_bad_selector() {
        let mut config = Config::default();
        config.crawler.subcategory_selector = "[[".to_string();
        assert!(matches!(
            check_runtime(&config),
            Err(AppError::Selector { .. })
        ));
    }

    #[test]
    fn test_check_runtime_rejects_bad_product_selector() {
        let mut config = Config::default();
        config.products.variant_selector = "[[".to_string();
        assert!(matches!(
            check_runtime(&config),
            Err(AppError::Selector { .. })
        ));
    }

    #[test]
    fn test_snapshot_mode_is_noted_for_ingest() {
        let mut config = Config::default();
        assert_eq!(output_mode_note(&config, "ingest"), None);

        config.storage.output_mode = OutputMode::Snapshot;
        let note = output_mode_note(&config, "ingest").unwrap();
        assert!(note.contains("only applies to crawl"));
        assert!(note.contains("ingest writes to"));
    }
}
