//! Pipeline entry points.
//!
//! - `run_crawl`: Discover the category tree and save it
//! - `run_ingest`: Reconcile one catalog batch
//! - `Supervisor`: Run consumer, scheduler and ingestion until cancelled

pub mod crawl;
pub mod ingest;
pub mod reconcile;
pub mod scheduler;
pub mod source;
pub mod supervisor;

pub use crawl::run_crawl;
pub use ingest::run_ingest;
pub use reconcile::{ReconcileReport, ReconciliationEngine};
pub use scheduler::{
    FavoritePriorityScheduler, ProductRefresher, SnapshotRefresher, StoredProductRefresher,
};
pub use source::{CatalogBatch, CatalogSource, LiveCatalogSource, SnapshotSource};
pub use supervisor::{Supervisor, SupervisorReport};
