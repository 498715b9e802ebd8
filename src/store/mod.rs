//! Billing and anomaly storage
//!
//! 課金データの集計取得と異常ドキュメントの永続化

pub mod bulk;
pub mod document;
pub mod elasticsearch;
pub mod memory;

use crate::analytics::anomaly::ProductSeries;
use crate::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

pub use bulk::BulkWriter;
pub use document::{AnomalyCost, AnomalyDocument, StoredAnomaly};
pub use elasticsearch::ElasticsearchStore;
pub use memory::InMemoryStore;

/// 日次コスト系列の取得元
#[async_trait]
pub trait CostSeriesSource: Send + Sync {
    /// Daily summed cost per product for `account` between `from` and `to`
    /// inclusive, each series ascending by date.
    ///
    /// Returns `Error::NotFound` when no billing data exists for the account.
    async fn fetch_daily_costs(
        &self,
        account: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ProductSeries>>;
}

/// 異常ドキュメントの保存先
#[async_trait]
pub trait AnomalyStore: Send + Sync {
    /// Indexes every document under its id, overwriting existing ones.
    async fn write_batch(&self, account: &str, batch: &[StoredAnomaly]) -> Result<()>;

    /// Abnormal documents of `account` dated between `from` and `to`
    /// inclusive, ascending by date.
    ///
    /// Returns `Error::NotFound` when nothing was ever stored for the account.
    async fn fetch_abnormal(
        &self,
        account: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<StoredAnomaly>>;
}

/// Per-account anomaly index name.
pub fn anomaly_index(prefix: &str, account: &str) -> String {
    format!("{}-{}", prefix, account).to_lowercase()
}
