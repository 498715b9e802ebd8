//! Window Padding
//!
//! 参照期間の先頭をゼロコストで埋め、バンド計算後に取り除く

use super::types::{CostPoint, ProductSeries};
use chrono::NaiveDate;

/// Prepends zero-cost days from `start` up to the series' first real day.
///
/// Days without billing data count as zero spend. An empty series, or one that
/// already starts on or before `start`, is returned unchanged.
pub fn pad_to(series: ProductSeries, start: NaiveDate) -> ProductSeries {
    let Some(first) = series.first_date() else {
        return series;
    };
    if first <= start {
        return series;
    }

    let padding = start
        .iter_days()
        .take_while(|date| *date < first)
        .map(|date| CostPoint::new(date, 0.0));

    let points = padding.chain(series.points).collect();
    ProductSeries::new(series.product, points)
}

/// Drops every point dated before `start`.
pub fn trim_look_back(points: Vec<CostPoint>, start: NaiveDate) -> Vec<CostPoint> {
    points.into_iter().filter(|p| p.date >= start).collect()
}
