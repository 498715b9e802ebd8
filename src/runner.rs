//! Anomaly detection run
//!
//! 1アカウント分の検知処理を順番に実行する

use crate::analytics::anomaly::{
    AnomalyCandidate, BollingerBand, DailyPodium, DailyTotal, DetectionWindow, DisturbanceFilter,
    ProductSeries, RecurrenceMatcher,
};
use crate::config::DetectionConfig;
use crate::error::{Error, Result};
use crate::store::bulk::{BulkWriter, DEFAULT_BATCH_SIZE};
use crate::store::document::{AnomalyDocument, StoredAnomaly};
use crate::store::{AnomalyStore, CostSeriesSource};
use chrono::{Months, NaiveDate, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

/// Counts collected during one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub account: String,
    /// 取得した製品系列の数
    pub products: usize,
    /// バンド検知で見つかった候補
    pub candidates: usize,
    /// 外乱として除外された候補
    pub suppressed: usize,
    /// 書き込んだ異常ドキュメント
    pub persisted: usize,
    /// 定期異常として更新したドキュメント
    pub recurrent: usize,
}

/// 異常検知ランナー
pub struct AnomalyDetectionRunner {
    source: Arc<dyn CostSeriesSource>,
    store: Arc<dyn AnomalyStore>,
    config: DetectionConfig,
    bulk_batch_size: usize,
}

impl AnomalyDetectionRunner {
    pub fn new(
        source: Arc<dyn CostSeriesSource>,
        store: Arc<dyn AnomalyStore>,
        config: DetectionConfig,
    ) -> Self {
        Self {
            source,
            store,
            config,
            bulk_batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_bulk_batch_size(mut self, bulk_batch_size: usize) -> Self {
        self.bulk_batch_size = bulk_batch_size;
        self
    }

    /// Runs detection for `account` over the trailing window ending today (UTC).
    pub async fn run_detection(
        &self,
        account: &str,
        token: &CancellationToken,
    ) -> Result<RunSummary> {
        self.run_detection_at(account, Utc::now().date_naive(), token)
            .await
    }

    /// Runs detection for `account` over the trailing window ending on `today`.
    ///
    /// Any failure other than a missing index aborts the run. Batches written
    /// before the failure stay written.
    pub async fn run_detection_at(
        &self,
        account: &str,
        today: NaiveDate,
        token: &CancellationToken,
    ) -> Result<RunSummary> {
        let window = DetectionWindow::trailing(
            today,
            self.config.look_back_days,
            self.config.window_length,
        );
        let span = info_span!("anomaly_detection", account = %account);

        self.run_window(account, window, token).instrument(span).await
    }

    async fn run_window(
        &self,
        account: &str,
        window: DetectionWindow,
        token: &CancellationToken,
    ) -> Result<RunSummary> {
        info!(start = %window.start, end = %window.end, "anomaly detection started");
        let mut summary = RunSummary {
            account: account.to_string(),
            ..RunSummary::default()
        };

        let series = match cancellable(
            token,
            self.source
                .fetch_daily_costs(account, window.padded_start, window.end),
        )
        .await
        {
            Ok(series) => series,
            Err(e) if e.is_not_found() => {
                warn!(error = %e, "no billing data, nothing to detect");
                return Ok(summary);
            }
            Err(e) => return Err(e),
        };
        summary.products = series.len();

        let candidates = self.detect(&series, &window);
        summary.candidates = candidates.len();

        let cleaned = DisturbanceFilter::new(
            self.config.min_percent_of_daily_bill,
            self.config.min_absolute_cost,
        )
        .clean(
            candidates,
            &DailyTotal::from_series(&series),
            &DailyPodium::from_series(&series, self.config.podium_size),
        );
        summary.suppressed = cleaned.removed.len();

        let documents = cleaned
            .kept
            .iter()
            .map(|c| StoredAnomaly::identified(AnomalyDocument::from_candidate(account, c)))
            .collect::<Result<Vec<_>>>()?;
        summary.persisted = self.persist(account, documents, token).await?;

        summary.recurrent = self.mark_recurrences(account, &window, token).await?;

        info!(
            products = summary.products,
            candidates = summary.candidates,
            suppressed = summary.suppressed,
            persisted = summary.persisted,
            recurrent = summary.recurrent,
            "anomaly detection finished"
        );
        Ok(summary)
    }

    /// バンド検知（全製品）
    fn detect(&self, series: &[ProductSeries], window: &DetectionWindow) -> Vec<AnomalyCandidate> {
        let band = BollingerBand::new(
            self.config.window_length,
            self.config.upper_band_coefficient,
            self.config.std_dev_coefficient,
        );
        series
            .iter()
            .filter(|s| !s.is_empty())
            .flat_map(|s| band.detect(s.clone(), window))
            .collect()
    }

    async fn persist(
        &self,
        account: &str,
        documents: Vec<StoredAnomaly>,
        token: &CancellationToken,
    ) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }
        let mut writer = BulkWriter::new(self.store.as_ref(), account, self.bulk_batch_size);
        cancellable(token, async move {
            for document in documents {
                writer.add(document).await?;
            }
            writer.close().await
        })
        .await
    }

    /// 定期異常を判定して再書き込み
    ///
    /// Reads back one extra month so anomalies at the start of the window can
    /// find their predecessor.
    async fn mark_recurrences(
        &self,
        account: &str,
        window: &DetectionWindow,
        token: &CancellationToken,
    ) -> Result<usize> {
        let from = window
            .start
            .checked_sub_months(Months::new(1))
            .unwrap_or(window.start);

        let stored = match cancellable(token, self.store.fetch_abnormal(account, from, window.end)).await {
            Ok(stored) => stored,
            Err(e) if e.is_not_found() => {
                info!(error = %e, "no stored anomalies to match");
                return Ok(0);
            }
            Err(e) => return Err(e),
        };

        let recurrent = RecurrenceMatcher::new(self.config.recurrence_tolerance)
            .match_recurrences(&stored);
        self.persist(account, recurrent, token).await
    }
}

/// Races `operation` against the token; a cancelled token fails the run.
async fn cancellable<T, F>(token: &CancellationToken, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Error::Cancelled),
        result = operation => result,
    }
}
