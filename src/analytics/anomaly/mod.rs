//! Anomaly Detection Module
//!
//! 日次コスト異常検知システム

mod detector;
mod disturbance;
mod padding;
mod recurrence;
mod types;

pub use detector::BollingerBand;
pub use disturbance::{DailyPodium, DailyTotal, DisturbanceFilter, FilterResult};
pub use padding::{pad_to, trim_look_back};
pub use recurrence::{parse_day, previous_month, RecurrenceMatcher};
pub use types::{AnomalyCandidate, AnomalyMetadata, CostPoint, DetectionWindow, ProductSeries};
