//! Analytics Module
//!
//! コスト異常検知

pub mod anomaly;

pub use anomaly::{
    AnomalyCandidate, BollingerBand, DailyPodium, DailyTotal, DetectionWindow, DisturbanceFilter,
    ProductSeries, RecurrenceMatcher,
};
