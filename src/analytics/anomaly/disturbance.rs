//! Disturbance Cleaning
//!
//! 統計的には異常だが金額的に無視できる候補を除外する

use super::types::{AnomalyCandidate, ProductSeries};
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::debug;

/// 日次合計コスト（全製品）
#[derive(Debug, Clone, Default)]
pub struct DailyTotal {
    totals: HashMap<NaiveDate, f64>,
}

impl DailyTotal {
    pub fn from_series(series: &[ProductSeries]) -> Self {
        let mut totals = HashMap::new();
        for point in series.iter().flat_map(|s| &s.points) {
            *totals.entry(point.date).or_insert(0.0) += point.cost;
        }
        Self { totals }
    }

    /// Total spend on `date`, zero for unknown days.
    pub fn get(&self, date: NaiveDate) -> f64 {
        self.totals.get(&date).copied().unwrap_or(0.0)
    }
}

/// 日次の上位支出製品
#[derive(Debug, Clone, Default)]
pub struct DailyPodium {
    ranks: HashMap<NaiveDate, Vec<String>>,
}

impl DailyPodium {
    /// Ranks products by cost for every day, keeping the `size` highest.
    ///
    /// Equal costs are ordered by product code so rankings are stable.
    pub fn from_series(series: &[ProductSeries], size: usize) -> Self {
        let mut days: HashMap<NaiveDate, Vec<(&str, f64)>> = HashMap::new();
        for s in series {
            for point in &s.points {
                days.entry(point.date)
                    .or_default()
                    .push((s.product.as_str(), point.cost));
            }
        }

        let ranks = days
            .into_iter()
            .map(|(date, mut entries)| {
                entries.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
                let podium = entries
                    .into_iter()
                    .take(size)
                    .map(|(product, _)| product.to_string())
                    .collect();
                (date, podium)
            })
            .collect();

        Self { ranks }
    }

    /// Products on the podium for `date`, highest spender first.
    pub fn ranking(&self, date: NaiveDate) -> &[String] {
        self.ranks.get(&date).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, date: NaiveDate, product: &str) -> bool {
        self.ranking(date).iter().any(|p| p == product)
    }
}

/// Result of a cleaning pass, partitioning candidates into kept and removed.
#[derive(Debug, Clone, Default)]
pub struct FilterResult {
    pub kept: Vec<AnomalyCandidate>,
    pub removed: Vec<AnomalyCandidate>,
}

/// 外乱除去フィルタ
#[derive(Debug, Clone, PartialEq)]
pub struct DisturbanceFilter {
    /// 日次請求額に対する最小増加率（%）
    min_percent_of_daily_bill: f64,
    /// 最小コスト
    min_absolute_cost: f64,
}

impl DisturbanceFilter {
    pub fn new(min_percent_of_daily_bill: f64, min_absolute_cost: f64) -> Self {
        Self {
            min_percent_of_daily_bill,
            min_absolute_cost,
        }
    }

    /// Whether the candidate is large enough, in money, to report.
    pub fn is_significant(&self, candidate: &AnomalyCandidate, totals: &DailyTotal) -> bool {
        let threshold = totals.get(candidate.date) * self.min_percent_of_daily_bill / 100.0;
        candidate.increase() >= threshold && candidate.cost >= self.min_absolute_cost
    }

    /// 候補を保持・除外に分類
    ///
    /// A candidate is kept only when it is significant and its product was
    /// already among the day's top spenders.
    pub fn clean(
        &self,
        candidates: Vec<AnomalyCandidate>,
        totals: &DailyTotal,
        podium: &DailyPodium,
    ) -> FilterResult {
        let (kept, removed): (Vec<_>, Vec<_>) = candidates.into_iter().partition(|c| {
            self.is_significant(c, totals) && podium.contains(c.date, c.metadata.product_code())
        });

        for c in &removed {
            debug!(
                product = c.metadata.product_code(),
                date = %c.date,
                cost = c.cost,
                upper_band = c.upper_band,
                "disturbance suppressed"
            );
        }

        FilterResult { kept, removed }
    }
}
