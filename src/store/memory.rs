//! In-memory store
//!
//! Both storage traits backed by maps, for tests and dry runs. Billing line
//! items are aggregated per product per day the same way the search backend
//! aggregates them.

use super::document::{AnomalyDocument, StoredAnomaly};
use super::{anomaly_index, AnomalyStore, CostSeriesSource};
use crate::analytics::anomaly::{parse_day, CostPoint, ProductSeries};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// 課金明細行
#[derive(Debug, Clone, PartialEq)]
pub struct LineItem {
    pub product: String,
    pub usage_start: DateTime<Utc>,
    pub cost: f64,
}

/// インメモリストア
pub struct InMemoryStore {
    index_prefix: String,
    line_items: RwLock<HashMap<String, Vec<LineItem>>>,
    anomalies: RwLock<HashMap<String, BTreeMap<String, AnomalyDocument>>>,
}

impl InMemoryStore {
    pub fn new(index_prefix: impl Into<String>) -> Self {
        Self {
            index_prefix: index_prefix.into(),
            line_items: RwLock::new(HashMap::new()),
            anomalies: RwLock::new(HashMap::new()),
        }
    }

    /// 明細行を追加
    pub async fn add_line_item(&self, account: &str, item: LineItem) {
        self.line_items
            .write()
            .await
            .entry(account.to_string())
            .or_default()
            .push(item);
    }

    /// Adds one line item per day starting at `start`.
    pub async fn add_daily_costs(&self, account: &str, product: &str, start: NaiveDate, costs: &[f64]) {
        let mut items = self.line_items.write().await;
        let entry = items.entry(account.to_string()).or_default();
        for (date, cost) in start.iter_days().zip(costs) {
            entry.push(LineItem {
                product: product.to_string(),
                usage_start: date.and_time(chrono::NaiveTime::MIN).and_utc(),
                cost: *cost,
            });
        }
    }

    /// Stores a document directly, bypassing detection.
    pub async fn insert_anomaly(&self, anomaly: StoredAnomaly) {
        let index = anomaly_index(&self.index_prefix, &anomaly.document.account);
        self.anomalies
            .write()
            .await
            .entry(index)
            .or_default()
            .insert(anomaly.id, anomaly.document);
    }

    /// Every stored document of `account`, ordered by id.
    pub async fn anomalies(&self, account: &str) -> Vec<StoredAnomaly> {
        let index = anomaly_index(&self.index_prefix, account);
        self.anomalies
            .read()
            .await
            .get(&index)
            .map(|docs| {
                docs.iter()
                    .map(|(id, document)| StoredAnomaly {
                        id: id.clone(),
                        document: document.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl CostSeriesSource for InMemoryStore {
    async fn fetch_daily_costs(
        &self,
        account: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ProductSeries>> {
        let items = self.line_items.read().await;
        let items = items
            .get(account)
            .ok_or_else(|| Error::NotFound(format!("no billing data for account {}", account)))?;

        let mut per_product: BTreeMap<&str, BTreeMap<NaiveDate, f64>> = BTreeMap::new();
        for item in items {
            let date = item.usage_start.date_naive();
            if date < from || date > to {
                continue;
            }
            *per_product
                .entry(item.product.as_str())
                .or_default()
                .entry(date)
                .or_insert(0.0) += item.cost;
        }

        Ok(per_product
            .into_iter()
            .map(|(product, days)| ProductSeries::new(product, fill_gaps(days)))
            .collect())
    }
}

/// Daily points from the first to the last known day, zero where a day has
/// no line items.
fn fill_gaps(days: BTreeMap<NaiveDate, f64>) -> Vec<CostPoint> {
    let (Some(first), Some(last)) = (days.keys().next(), days.keys().next_back()) else {
        return Vec::new();
    };
    first
        .iter_days()
        .take_while(|date| date <= last)
        .map(|date| CostPoint::new(date, days.get(&date).copied().unwrap_or(0.0)))
        .collect()
}

#[async_trait]
impl AnomalyStore for InMemoryStore {
    async fn write_batch(&self, account: &str, batch: &[StoredAnomaly]) -> Result<()> {
        let index = anomaly_index(&self.index_prefix, account);
        let mut anomalies = self.anomalies.write().await;
        let docs = anomalies.entry(index).or_default();
        for anomaly in batch {
            docs.insert(anomaly.id.clone(), anomaly.document.clone());
        }
        Ok(())
    }

    async fn fetch_abnormal(
        &self,
        account: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<StoredAnomaly>> {
        let index = anomaly_index(&self.index_prefix, account);
        let anomalies = self.anomalies.read().await;
        let docs = anomalies
            .get(&index)
            .ok_or_else(|| Error::NotFound(format!("index {} does not exist", index)))?;

        let mut found: Vec<(NaiveDate, StoredAnomaly)> = docs
            .iter()
            .filter(|(_, doc)| doc.abnormal)
            .filter_map(|(id, doc)| {
                let date = parse_day(&doc.date)?;
                (date >= from && date <= to).then(|| {
                    (
                        date,
                        StoredAnomaly {
                            id: id.clone(),
                            document: doc.clone(),
                        },
                    )
                })
            })
            .collect();
        found.sort_by_key(|(date, _)| *date);

        Ok(found.into_iter().map(|(_, anomaly)| anomaly).collect())
    }
}
