//! Local filesystem record store.
//!
//! State is kept in memory and mirrored to files under the data directory.
//! Per-item mutations (product upserts, price changes, notifications) are
//! appended to JSON-lines journals, one line per call, so a call costs one
//! record plus one sync no matter how large the catalog is. Batch-level
//! files (categories, variants, images, favorites) are rewritten whole via
//! a temp file and a rename. Memory is only updated after the write
//! succeeded, so a failed call leaves both sides unchanged.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{
    CategoryTree, Favorite, NewNotification, Notification, PriceHistoryEntry, Product, ProductId,
    Variant,
};
use crate::storage::{FavoriteStore, NotificationStore, PriceHistoryLedger, StorageHandler};

const CATALOG: &str = "catalog.jsonl";
const NOTIFICATIONS: &str = "notifications.jsonl";
const CATEGORIES: &str = "categories.json";
const VARIANTS: &str = "variants.json";
const IMAGES: &str = "images.json";
const FAVORITES: &str = "favorites.json";

/// Catalog journal length (in lines) above which it is compacted on open.
const COMPACT_AFTER: usize = 1024;

/// One line of the catalog journal.
///
/// A price change carries both the new product state and its history
/// entry, so the two are committed by the same line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum CatalogEntry {
    Upsert {
        products: Vec<Product>,
    },
    PriceChange {
        product: Product,
        entry: PriceHistoryEntry,
    },
    Compacted {
        products: Vec<Product>,
        history: Vec<PriceHistoryEntry>,
    },
}

#[derive(Debug, Default)]
struct Catalog {
    products: BTreeMap<ProductId, Product>,
    history: Vec<PriceHistoryEntry>,
}

impl Catalog {
    fn apply(&mut self, entry: CatalogEntry) {
        match entry {
            CatalogEntry::Upsert { products } => {
                for product in products {
                    self.products.insert(product.id, product);
                }
            }
            CatalogEntry::PriceChange { product, entry } => {
                self.products.insert(product.id, product);
                self.history.push(entry);
            }
            CatalogEntry::Compacted { products, history } => {
                self.products = products.into_iter().map(|p| (p.id, p)).collect();
                self.history = history;
            }
        }
    }

    fn compacted(&self) -> CatalogEntry {
        CatalogEntry::Compacted {
            products: self.products.values().cloned().collect(),
            history: self.history.clone(),
        }
    }
}

/// Append-only JSON-lines file.
///
/// Every append is made of whole lines followed by a data sync. A partial
/// append is cut off again, and a torn last line left by a crash is cut
/// off on open, so the file always ends on a line boundary.
#[derive(Debug)]
struct Journal {
    path: PathBuf,
    len: u64,
}

impl Journal {
    /// Open a journal and read back its records.
    async fn open<T: DeserializeOwned>(path: PathBuf) -> Result<(Self, Vec<T>)> {
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(AppError::Io(e)),
        };

        let mut records = Vec::new();
        let mut intact = 0;
        let lines: Vec<&[u8]> = bytes.split_inclusive(|&b| b == b'\n').collect();
        for (i, line) in lines.iter().enumerate() {
            let is_last = i + 1 == lines.len();
            let Some(body) = line.strip_suffix(b"\n") else {
                break;
            };
            if !body.is_empty() {
                match serde_json::from_slice(body) {
                    Ok(record) => records.push(record),
                    Err(_) if is_last => break,
                    Err(e) => {
                        return Err(AppError::store(format!(
                            "{} line {} is corrupt: {e}",
                            path.display(),
                            i + 1
                        )));
                    }
                }
            }
            intact += line.len();
        }

        if intact < bytes.len() {
            log::warn!(
                "Discarding {} bytes of an unfinished write at the end of {}",
                bytes.len() - intact,
                path.display()
            );
            let file = tokio::fs::OpenOptions::new().write(true).open(&path).await?;
            file.set_len(intact as u64).await?;
            file.sync_all().await?;
        }

        Ok((
            Self {
                path,
                len: intact as u64,
            },
            records,
        ))
    }

    async fn append<T: Serialize>(&mut self, records: &[T]) -> Result<()> {
        let mut buf = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let written = match file.write_all(&buf).await {
            Ok(()) => file.sync_data().await,
            Err(e) => Err(e),
        };

        match written {
            Ok(()) => {
                self.len += buf.len() as u64;
                Ok(())
            }
            Err(e) => {
                if let Err(cut) = file.set_len(self.len).await {
                    log::error!(
                        "Could not cut partial append from {}: {cut}",
                        self.path.display()
                    );
                }
                Err(AppError::store(format!(
                    "failed to append to {}: {e}",
                    self.path.display()
                )))
            }
        }
    }

    /// Replace the whole journal with `records`.
    async fn rewrite<T: Serialize>(&mut self, records: &[T]) -> Result<()> {
        let mut buf = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }
        replace_file(&self.path, &buf).await?;
        self.len = buf.len() as u64;
        Ok(())
    }
}

#[derive(Debug)]
struct State {
    catalog: Catalog,
    catalog_log: Journal,
    notifications: Vec<Notification>,
    notification_log: Journal,
    categories: CategoryTree,
    variants: BTreeMap<u64, Variant>,
    images: BTreeSet<String>,
    favorites: Vec<Favorite>,
}

/// Persisted record store backed by a directory of JSON files.
pub struct LocalStore {
    root_dir: PathBuf,
    state: Mutex<State>,
}

impl LocalStore {
    /// Open the store rooted at `root_dir`, loading any existing files.
    ///
    /// A long catalog journal is compacted into a single line first.
    pub async fn open(root_dir: impl Into<PathBuf>) -> Result<Self> {
        let root_dir = root_dir.into();
        tokio::fs::create_dir_all(&root_dir).await?;

        let (mut catalog_log, entries) =
            Journal::open::<CatalogEntry>(root_dir.join(CATALOG)).await?;
        let journal_lines = entries.len();
        let mut catalog = Catalog::default();
        for entry in entries {
            catalog.apply(entry);
        }
        if journal_lines > COMPACT_AFTER {
            catalog_log.rewrite(&[catalog.compacted()]).await?;
            log::debug!("Compacted {journal_lines} catalog journal lines");
        }

        let (notification_log, notifications) =
            Journal::open::<Notification>(root_dir.join(NOTIFICATIONS)).await?;

        let state = State {
            catalog,
            catalog_log,
            notifications,
            notification_log,
            categories: read_json(&root_dir.join(CATEGORIES))
                .await?
                .unwrap_or_default(),
            variants: read_json(&root_dir.join(VARIANTS)).await?.unwrap_or_default(),
            images: read_json(&root_dir.join(IMAGES)).await?.unwrap_or_default(),
            favorites: read_json(&root_dir.join(FAVORITES)).await?.unwrap_or_default(),
        };

        log::debug!(
            "Opened store at {} ({} products, {} favorites)",
            root_dir.display(),
            state.catalog.products.len(),
            state.favorites.len()
        );

        Ok(Self {
            root_dir,
            state: Mutex::new(state),
        })
    }

    /// Directory the store writes to.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// The last saved category tree.
    pub async fn categories(&self) -> CategoryTree {
        self.state.lock().await.categories.clone()
    }

    /// Write JSON data atomically (write to temp, then rename).
    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        replace_file(&self.root_dir.join(key), &bytes).await
    }
}

/// Replace `path` with `bytes` via a synced temp file and a rename.
async fn replace_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");

    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| AppError::store(format!("failed to replace {}: {e}", path.display())))
}

/// Read JSON data, returning None if the file doesn't exist.
async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::Io(e)),
    }
}

#[async_trait]
impl StorageHandler for LocalStore {
    async fn save_categories(&self, tree: &CategoryTree) -> Result<()> {
        let mut state = self.state.lock().await;
        self.write_json(CATEGORIES, tree).await?;
        state.categories = tree.clone();
        Ok(())
    }

    async fn save_products(&self, products: &[Product]) -> Result<()> {
        if products.is_empty() {
            return Ok(());
        }
        let mut state = self.state.lock().await;
        let entry = CatalogEntry::Upsert {
            products: products.to_vec(),
        };
        state.catalog_log.append(&[&entry]).await?;
        state.catalog.apply(entry);
        Ok(())
    }

    async fn save_variants(&self, variants: &[Variant]) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut all = state.variants.clone();
        for variant in variants {
            all.insert(variant.id, variant.clone());
        }
        self.write_json(VARIANTS, &all).await?;
        state.variants = all;
        Ok(())
    }

    async fn save_images(&self, urls: &[String]) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut all = state.images.clone();
        all.extend(urls.iter().cloned());
        self.write_json(IMAGES, &all).await?;
        state.images = all;
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.lock().await.catalog.products.get(&id).cloned())
    }
}

#[async_trait]
impl PriceHistoryLedger for LocalStore {
    async fn record_price_change(
        &self,
        product: &Product,
        entry: &PriceHistoryEntry,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let line = CatalogEntry::PriceChange {
            product: product.clone(),
            entry: entry.clone(),
        };
        state.catalog_log.append(&[&line]).await?;
        state.catalog.apply(line);
        Ok(())
    }

    async fn history(&self, id: ProductId) -> Result<Vec<PriceHistoryEntry>> {
        let state = self.state.lock().await;
        let mut entries: Vec<_> = state
            .catalog
            .history
            .iter()
            .filter(|e| e.product_id == id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.recorded_at);
        Ok(entries)
    }
}

#[async_trait]
impl FavoriteStore for LocalStore {
    async fn add_favorite(&self, user_id: &str, product_id: ProductId) -> Result<Favorite> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state
            .favorites
            .iter()
            .find(|f| f.user_id == user_id && f.product_id == product_id)
        {
            return Ok(existing.clone());
        }

        let now = Utc::now();
        let favorite = Favorite {
            id: state.favorites.iter().map(|f| f.id).max().unwrap_or(0) + 1,
            user_id: user_id.to_string(),
            product_id,
            created_at: now,
            updated_at: now,
        };
        let mut favorites = state.favorites.clone();
        favorites.push(favorite.clone());
        self.write_json(FAVORITES, &favorites).await?;
        state.favorites = favorites;
        Ok(favorite)
    }

    async fn favorites_for(&self, id: ProductId) -> Result<Vec<Favorite>> {
        let state = self.state.lock().await;
        Ok(state
            .favorites
            .iter()
            .filter(|f| f.product_id == id)
            .cloned()
            .collect())
    }

    async fn favorited_product_ids(&self) -> Result<Vec<ProductId>> {
        let state = self.state.lock().await;
        let ids: BTreeSet<_> = state.favorites.iter().map(|f| f.product_id).collect();
        Ok(ids.into_iter().collect())
    }
}

#[async_trait]
impl NotificationStore for LocalStore {
    async fn insert_notification(&self, notification: NewNotification) -> Result<Notification> {
        let mut state = self.state.lock().await;
        let id = state.notifications.last().map_or(0, |n| n.id) + 1;
        let notification = notification.into_notification(id, Utc::now());

        state.notification_log.append(&[&notification]).await?;
        state.notifications.push(notification.clone());
        Ok(notification)
    }

    async fn notifications(&self) -> Result<Vec<Notification>> {
        Ok(self.state.lock().await.notifications.clone())
    }
}
