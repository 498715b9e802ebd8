//! Test fixtures
//!
//! テスト用の共通データとヘルパー
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use cost_anomaly_rs::config::DetectionConfig;
use cost_anomaly_rs::store::{AnomalyStore, InMemoryStore, StoredAnomaly};
use cost_anomaly_rs::{AnomalyDetectionRunner, Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const ACCOUNT: &str = "123456789012";
pub const INDEX_PREFIX: &str = "anomalies-product";

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// First day of seeded billing history
pub fn history_start() -> NaiveDate {
    day(2020, 1, 1)
}

/// Current day of every run
pub fn today() -> NaiveDate {
    day(2020, 2, 20)
}

pub fn detection_config() -> DetectionConfig {
    DetectionConfig {
        window_length: 7,
        upper_band_coefficient: 1.0,
        std_dev_coefficient: 2.0,
        min_percent_of_daily_bill: 5.0,
        min_absolute_cost: 10.0,
        podium_size: 3,
        recurrence_tolerance: 0.1,
        look_back_days: 30,
    }
}

/// Daily costs from `history_start()` to `today()`, `base` every day except
/// the listed spikes.
pub fn daily_costs(base: f64, spikes: &[(NaiveDate, f64)]) -> Vec<f64> {
    history_start()
        .iter_days()
        .take_while(|d| *d <= today())
        .map(|d| {
            spikes
                .iter()
                .find(|(date, _)| *date == d)
                .map(|(_, cost)| *cost)
                .unwrap_or(base)
        })
        .collect()
}

pub async fn seed(store: &InMemoryStore, product: &str, base: f64, spikes: &[(NaiveDate, f64)]) {
    store
        .add_daily_costs(ACCOUNT, product, history_start(), &daily_costs(base, spikes))
        .await;
}

pub fn new_store() -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::new(INDEX_PREFIX))
}

pub fn runner(store: &Arc<InMemoryStore>) -> AnomalyDetectionRunner {
    AnomalyDetectionRunner::new(store.clone(), store.clone(), detection_config())
}

/// Anomaly store that accepts a fixed number of bulk batches, then fails
/// every further write.
pub struct FailingStore {
    inner: Arc<InMemoryStore>,
    accepted: usize,
    batches_written: AtomicUsize,
}

impl FailingStore {
    pub fn new(inner: Arc<InMemoryStore>, accepted: usize) -> Self {
        Self {
            inner,
            accepted,
            batches_written: AtomicUsize::new(0),
        }
    }

    pub fn batches_written(&self) -> usize {
        self.batches_written.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnomalyStore for FailingStore {
    async fn write_batch(&self, account: &str, batch: &[StoredAnomaly]) -> Result<()> {
        if self.batches_written() >= self.accepted {
            return Err(Error::Bulk("simulated bulk failure".to_string()));
        }
        self.inner.write_batch(account, batch).await?;
        self.batches_written.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch_abnormal(
        &self,
        account: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<StoredAnomaly>> {
        self.inner.fetch_abnormal(account, from, to).await
    }
}
