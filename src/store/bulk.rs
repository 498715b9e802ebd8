//! Bulk Writer
//!
//! 異常ドキュメントをバッチ単位で書き込む

use super::document::StoredAnomaly;
use super::AnomalyStore;
use crate::error::Result;
use tracing::debug;

/// Default number of documents per bulk request
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Buffers documents and writes them in batches of `batch_size`.
///
/// Batches are written as soon as they fill up, so if a later batch or the
/// final `close` fails, earlier batches are already stored.
pub struct BulkWriter<'a> {
    store: &'a dyn AnomalyStore,
    account: String,
    batch_size: usize,
    pending: Vec<StoredAnomaly>,
    written: usize,
}

impl<'a> BulkWriter<'a> {
    pub fn new(store: &'a dyn AnomalyStore, account: impl Into<String>, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            store,
            account: account.into(),
            batch_size,
            pending: Vec::with_capacity(batch_size),
            written: 0,
        }
    }

    /// ドキュメントを追加（バッチが満杯なら書き込み）
    pub async fn add(&mut self, anomaly: StoredAnomaly) -> Result<()> {
        self.pending.push(anomaly);
        if self.pending.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// 保留中のドキュメントを書き込み
    pub async fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.pending);
        self.store.write_batch(&self.account, &batch).await?;
        self.written += batch.len();
        debug!(account = %self.account, documents = batch.len(), "bulk batch written");
        Ok(())
    }

    /// Flushes what is left and returns the number of documents written.
    pub async fn close(mut self) -> Result<usize> {
        self.flush().await?;
        Ok(self.written)
    }
}
