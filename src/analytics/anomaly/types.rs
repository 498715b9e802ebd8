//! Anomaly Detection Types
//!
//! 日次コスト異常検知用の型定義

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// 日次コストポイント
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostPoint {
    /// 利用日
    pub date: NaiveDate,
    /// その日の合計コスト
    pub cost: f64,
    /// 許容上限（バンド計算前は 0.0）
    pub upper_band: f64,
    /// 異常フラグ
    pub is_anomaly: bool,
}

impl CostPoint {
    /// コストのみを持つポイントを作成
    pub fn new(date: NaiveDate, cost: f64) -> Self {
        Self {
            date,
            cost,
            upper_band: 0.0,
            is_anomaly: false,
        }
    }
}

/// 製品ごとの日次コスト系列（日付昇順）
#[derive(Debug, Clone, PartialEq)]
pub struct ProductSeries {
    pub product: String,
    pub points: Vec<CostPoint>,
}

impl ProductSeries {
    pub fn new(product: impl Into<String>, points: Vec<CostPoint>) -> Self {
        Self {
            product: product.into(),
            points,
        }
    }

    /// Builds a series of consecutive days starting at `start`.
    pub fn from_daily_costs(product: impl Into<String>, start: NaiveDate, costs: &[f64]) -> Self {
        let points = start
            .iter_days()
            .zip(costs)
            .map(|(date, cost)| CostPoint::new(date, *cost))
            .collect();
        Self::new(product, points)
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Per-anomaly metadata. Every kind a detector can report is listed here so
/// consumers have to handle each one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnomalyMetadata {
    /// 製品単位の異常
    Product { product: String },
}

impl AnomalyMetadata {
    pub fn product(product: impl Into<String>) -> Self {
        AnomalyMetadata::Product {
            product: product.into(),
        }
    }

    /// Product the anomaly belongs to.
    pub fn product_code(&self) -> &str {
        match self {
            AnomalyMetadata::Product { product } => product,
        }
    }
}

/// バンド検知を通過した異常候補
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyCandidate {
    pub metadata: AnomalyMetadata,
    pub date: NaiveDate,
    pub cost: f64,
    pub upper_band: f64,
}

impl AnomalyCandidate {
    /// Amount by which the day's cost exceeds its upper band.
    pub fn increase(&self) -> f64 {
        self.cost - self.upper_band
    }
}

/// 検知ウィンドウ
///
/// `start..=end` is the range anomalies are reported for. `padded_start` lies
/// `window_length` days earlier and only seeds the rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionWindow {
    pub padded_start: NaiveDate,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DetectionWindow {
    /// Trailing window ending on `today`, covering `look_back_days` earlier days.
    pub fn trailing(today: NaiveDate, look_back_days: u32, window_length: usize) -> Self {
        let start = today
            .checked_sub_days(Days::new(u64::from(look_back_days)))
            .unwrap_or(NaiveDate::MIN);
        Self::new(start, today, window_length)
    }

    pub fn new(start: NaiveDate, end: NaiveDate, window_length: usize) -> Self {
        let padded_start = start
            .checked_sub_days(Days::new(window_length as u64))
            .unwrap_or(NaiveDate::MIN);
        Self {
            padded_start,
            start,
            end,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}
