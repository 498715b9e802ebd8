//! Recurrence Matching
//!
//! 前月同日に同程度のコストで発生した異常を「定期的」とみなす

use crate::store::document::StoredAnomaly;
use chrono::{DateTime, Datelike, NaiveDate};
use std::collections::HashMap;
use tracing::warn;

/// 定期異常の照合器
#[derive(Debug, Clone, PartialEq)]
pub struct RecurrenceMatcher {
    /// 許容誤差（0.1 = ±10%）
    tolerance: f64,
}

impl RecurrenceMatcher {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// Whether `current` lies within ±tolerance of `previous`.
    pub fn within_tolerance(&self, previous: f64, current: f64) -> bool {
        let a = previous * (1.0 - self.tolerance);
        let b = previous * (1.0 + self.tolerance);
        current >= a.min(b) && current <= a.max(b)
    }

    /// Returns the anomalies that repeat an abnormal cost of the same product
    /// one month earlier, with `recurrent` set.
    ///
    /// Anomalies already marked recurrent are not returned again. Documents
    /// whose date cannot be parsed are logged and skipped.
    pub fn match_recurrences(&self, anomalies: &[StoredAnomaly]) -> Vec<StoredAnomaly> {
        let mut by_product: HashMap<&str, HashMap<NaiveDate, &StoredAnomaly>> = HashMap::new();
        let mut dated = Vec::with_capacity(anomalies.len());

        for stored in anomalies {
            let Some(date) = parse_day(&stored.document.date) else {
                warn!(
                    id = %stored.id,
                    date = %stored.document.date,
                    "skipping anomaly with unparsable date"
                );
                continue;
            };
            by_product
                .entry(stored.document.product())
                .or_default()
                .insert(date, stored);
            dated.push((date, stored));
        }

        dated
            .into_iter()
            .filter(|(_, stored)| !stored.document.recurrent)
            .filter(|(date, stored)| {
                let Some(previous_date) = previous_month(*date) else {
                    return false;
                };
                by_product
                    .get(stored.document.product())
                    .and_then(|days| days.get(&previous_date))
                    .is_some_and(|previous| {
                        previous.document.abnormal
                            && self.within_tolerance(
                                previous.document.cost.value,
                                stored.document.cost.value,
                            )
                    })
            })
            .map(|(_, stored)| {
                let mut recurrent = stored.clone();
                recurrent.document.recurrent = true;
                recurrent
            })
            .collect()
    }
}

/// Same day of the previous month, `None` when that day does not exist
/// (e.g. March 30th has no February counterpart).
pub fn previous_month(date: NaiveDate) -> Option<NaiveDate> {
    let (year, month) = match date.month() {
        1 => (date.year() - 1, 12),
        m => (date.year(), m - 1),
    };
    NaiveDate::from_ymd_opt(year, month, date.day())
}

/// Calendar day of an ISO-8601 timestamp or plain `YYYY-MM-DD` date.
///
/// The day is taken as written, without converting to another offset.
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.date_naive())
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}
