//! Bollinger Band Detector
//!
//! 移動ウィンドウの上限バンドによる日次コスト異常検知

use super::padding::{pad_to, trim_look_back};
use super::types::{AnomalyCandidate, AnomalyMetadata, CostPoint, DetectionWindow, ProductSeries};
use tracing::trace;

/// 上限バンド検知器
#[derive(Debug, Clone, PartialEq)]
pub struct BollingerBand {
    /// 移動ウィンドウ長（日数）
    window_length: usize,
    /// 平均値に掛ける係数
    upper_band_coefficient: f64,
    /// 偏差項に掛ける係数
    std_dev_coefficient: f64,
}

impl BollingerBand {
    /// 新しい検知器を作成
    pub fn new(window_length: usize, upper_band_coefficient: f64, std_dev_coefficient: f64) -> Self {
        Self {
            window_length: window_length.max(1),
            upper_band_coefficient,
            std_dev_coefficient,
        }
    }

    pub fn window_length(&self) -> usize {
        self.window_length
    }

    /// Computes `upper_band` and `is_anomaly` for every point after the first.
    ///
    /// Point `i` is compared against the `min(i, window_length)` points before
    /// it. The deviation term is always divided by the configured window
    /// length, including during warm-up when fewer points are available.
    pub fn apply(&self, points: &mut [CostPoint]) {
        for i in 1..points.len() {
            let upper_band = {
                let w = i.min(self.window_length);
                self.upper_band(&points[i - w..i])
            };
            let point = &mut points[i];
            point.upper_band = upper_band;
            point.is_anomaly = point.cost > upper_band;
        }
    }

    fn upper_band(&self, window: &[CostPoint]) -> f64 {
        let avg = window.iter().map(|p| p.cost).sum::<f64>() / window.len() as f64;
        let sigma = window.iter().map(|p| (p.cost - avg).powi(2)).sum::<f64>();
        let deviation = sigma.sqrt() / self.window_length as f64;

        avg * self.upper_band_coefficient + deviation * self.std_dev_coefficient
    }

    /// 製品系列から異常候補を抽出
    ///
    /// The series is padded back to `window.padded_start`, banded, trimmed to
    /// `window.start` and reduced to the points flagged as anomalous.
    pub fn detect(&self, series: ProductSeries, window: &DetectionWindow) -> Vec<AnomalyCandidate> {
        let mut series = pad_to(series, window.padded_start);
        self.apply(&mut series.points);

        let product = series.product;
        let candidates: Vec<AnomalyCandidate> = trim_look_back(series.points, window.start)
            .into_iter()
            .filter(|p| p.is_anomaly)
            .map(|p| AnomalyCandidate {
                metadata: AnomalyMetadata::product(product.as_str()),
                date: p.date,
                cost: p.cost,
                upper_band: p.upper_band,
            })
            .collect();

        trace!(product = %product, candidates = candidates.len(), "bands computed");
        candidates
    }
}
