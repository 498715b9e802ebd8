//! Persisted anomaly documents
//!
//! One document per account, product and day. The document id is derived
//! from those three values so re-running detection overwrites instead of
//! duplicating.

use crate::analytics::anomaly::{AnomalyCandidate, AnomalyMetadata};
use crate::error::Result;
use chrono::{NaiveDate, NaiveTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Observed cost and the band it was compared to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyCost {
    pub value: f64,
    #[serde(rename = "maxExpected")]
    pub max_expected: f64,
}

/// Stored anomaly document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyDocument {
    pub account: String,
    /// ISO-8601 timestamp at midnight UTC of the anomalous day
    pub date: String,
    #[serde(flatten)]
    pub metadata: AnomalyMetadata,
    pub abnormal: bool,
    pub recurrent: bool,
    pub cost: AnomalyCost,
}

impl AnomalyDocument {
    /// Document for a confirmed candidate. `recurrent` always starts false.
    pub fn from_candidate(account: &str, candidate: &AnomalyCandidate) -> Self {
        Self {
            account: account.to_string(),
            date: format_date(candidate.date),
            metadata: candidate.metadata.clone(),
            abnormal: true,
            recurrent: false,
            cost: AnomalyCost {
                value: candidate.cost,
                max_expected: candidate.upper_band,
            },
        }
    }

    pub fn product(&self) -> &str {
        self.metadata.product_code()
    }

    pub fn document_id(&self) -> Result<String> {
        document_id(&self.account, &self.date, &self.metadata)
    }
}

/// A document together with the id it is stored under
#[derive(Debug, Clone, PartialEq)]
pub struct StoredAnomaly {
    pub id: String,
    pub document: AnomalyDocument,
}

impl StoredAnomaly {
    /// Wraps a freshly built document, deriving its id.
    pub fn identified(document: AnomalyDocument) -> Result<Self> {
        let id = document.document_id()?;
        Ok(Self { id, document })
    }
}

#[derive(Serialize)]
struct DocumentIdentity<'a> {
    account: &'a str,
    date: &'a str,
    #[serde(flatten)]
    metadata: &'a AnomalyMetadata,
}

/// SHA-256 of the (account, date, metadata) identity, hex encoded.
pub fn document_id(account: &str, date: &str, metadata: &AnomalyMetadata) -> Result<String> {
    let identity = DocumentIdentity {
        account,
        date,
        metadata,
    };
    let bytes = serde_json::to_vec(&identity)?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Midnight UTC of `date` as `YYYY-MM-DDT00:00:00Z`.
pub fn format_date(date: NaiveDate) -> String {
    date.and_time(NaiveTime::MIN)
        .and_utc()
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}
