// src/lib.rs

//! pricewatch: catalog price tracking with price-drop notifications.
//!
//! Catalog batches are reconciled against stored state; price changes are
//! recorded in an append-only ledger and drops on favorited products are
//! published on a message bus, where a consumer turns them into
//! notification records. A bounded crawler discovers the category tree.

pub mod bus;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
