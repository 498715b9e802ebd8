//! # cost-anomaly-rs
//!
//! Day-over-day cost anomaly detection for billing line items grouped by
//! product.
//!
//! A run for one account fetches daily costs per product, flags days above a
//! rolling upper band, drops flags that are economically negligible, persists
//! the rest under deterministic ids, then marks anomalies that repeat the
//! previous month's abnormal cost as recurrent.

pub mod analytics;
pub mod config;
pub mod error;
pub mod logging;
pub mod runner;
pub mod store;

pub use crate::config::AppConfig;
pub use error::{Error, Result};
pub use runner::{AnomalyDetectionRunner, RunSummary};
