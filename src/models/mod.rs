// src/models/mod.rs

//! Domain models for the price tracking pipeline.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod category;
mod config;
mod event;
mod favorite;
mod product;

// Re-export all public types
pub use category::{Category, CategoryId, CategoryLink, CategoryTree, category_id};
pub use config::{
    BusConfig, Config, CrawlerConfig, LoggingConfig, OutputMode, ProductsConfig, SchedulerConfig,
    StorageConfig,
};
pub use event::PriceDropEvent;
pub use favorite::{Favorite, NewNotification, Notification, NotificationKind};
pub use product::{
    Price, PriceHistoryEntry, Product, ProductId, Promotion, Rating, SocialProof, Variant,
};
