//! Elasticsearch-compatible REST backend
//!
//! 検索エンジンへの集計クエリと bulk 書き込み

use super::document::{AnomalyDocument, StoredAnomaly};
use super::{anomaly_index, AnomalyStore, CostSeriesSource};
use crate::analytics::anomaly::{CostPoint, ProductSeries};
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Billing record field holding the account identifier
pub const ACCOUNT_FIELD: &str = "usageAccountId";
/// Billing record field holding the line item cost
pub const COST_FIELD: &str = "unblendedCost";
/// Billing record field holding the usage start timestamp
pub const USAGE_START_FIELD: &str = "usageStartDate";
/// Billing record field holding the product code
pub const PRODUCT_FIELD: &str = "productCode";

const MAX_PRODUCTS: usize = 10_000;
const MAX_ANOMALY_HITS: usize = 10_000;

/// Elasticsearch ストア
pub struct ElasticsearchStore {
    client: reqwest::Client,
    endpoint: Url,
    billing_index: String,
    anomaly_index_prefix: String,
    credentials: Option<(String, String)>,
}

impl ElasticsearchStore {
    /// 設定からストアを作成
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let mut endpoint = Url::parse(&config.endpoint).map_err(|e| {
            Error::InvalidConfiguration(format!("store.endpoint {}: {}", config.endpoint, e))
        })?;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        let credentials = config
            .username
            .clone()
            .map(|user| (user, config.password.clone().unwrap_or_default()));

        Ok(Self {
            client,
            endpoint,
            billing_index: config.billing_index.clone(),
            anomaly_index_prefix: config.anomaly_index_prefix.clone(),
            credentials,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.endpoint
            .join(path)
            .map_err(|e| Error::InvalidConfiguration(format!("{}: {}", path, e)))
    }

    fn post(&self, url: Url) -> reqwest::RequestBuilder {
        let request = self.client.post(url);
        match &self.credentials {
            Some((user, password)) => request.basic_auth(user, Some(password)),
            None => request,
        }
    }

    /// 検索リクエストを実行
    async fn search(&self, index: &str, body: &Value) -> Result<Value> {
        let url = self.url(&format!("{}/_search", index))?;
        let response = self.post(url).json(body).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let error_text = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND && error_text.contains("index_not_found_exception") {
            return Err(Error::NotFound(format!("index {} does not exist", index)));
        }
        Err(Error::Query(format!(
            "search on {} failed: {} - {}",
            index, status, error_text
        )))
    }
}

#[async_trait]
impl CostSeriesSource for ElasticsearchStore {
    async fn fetch_daily_costs(
        &self,
        account: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ProductSeries>> {
        let body = cost_query(account, from, to);
        let response = self.search(&self.billing_index, &body).await?;
        parse_cost_aggregation(&response)
    }
}

#[async_trait]
impl AnomalyStore for ElasticsearchStore {
    async fn write_batch(&self, account: &str, batch: &[StoredAnomaly]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let index = anomaly_index(&self.anomaly_index_prefix, account);
        let body = bulk_body(&index, batch)?;

        let response = self
            .post(self.url("_bulk")?)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Bulk(format!("{} - {}", status, error_text)));
        }

        let result: Value = response.json().await?;
        check_bulk_response(&result)?;
        debug!(index = %index, documents = batch.len(), "bulk request accepted");
        Ok(())
    }

    async fn fetch_abnormal(
        &self,
        account: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<StoredAnomaly>> {
        let index = anomaly_index(&self.anomaly_index_prefix, account);
        let body = abnormal_query(account, from, to);
        let response = self.search(&index, &body).await?;
        let anomalies = parse_anomaly_hits(&response)?;

        if let Some(total) = total_hits(&response) {
            if total > anomalies.len() as u64 {
                warn!(
                    index = %index,
                    total,
                    returned = anomalies.len(),
                    "anomaly read-back truncated, recurrences may be missed"
                );
            }
        }
        Ok(anomalies)
    }
}

/// Sum of cost per product per day for one account.
pub fn cost_query(account: &str, from: NaiveDate, to: NaiveDate) -> Value {
    json!({
        "size": 0,
        "query": {
            "bool": {
                "filter": [
                    { "term": { ACCOUNT_FIELD: account } },
                    { "range": { USAGE_START_FIELD: {
                        "gte": from.format("%Y-%m-%d").to_string(),
                        "lte": to.format("%Y-%m-%d").to_string(),
                        "format": "yyyy-MM-dd"
                    } } }
                ]
            }
        },
        "aggs": {
            "products": {
                "terms": { "field": PRODUCT_FIELD, "size": MAX_PRODUCTS },
                "aggs": {
                    "days": {
                        "date_histogram": {
                            "field": USAGE_START_FIELD,
                            "calendar_interval": "day",
                            "min_doc_count": 0
                        },
                        "aggs": {
                            "cost": { "sum": { "field": COST_FIELD } }
                        }
                    }
                }
            }
        }
    })
}

/// Abnormal anomaly documents of one account, oldest first.
pub fn abnormal_query(account: &str, from: NaiveDate, to: NaiveDate) -> Value {
    json!({
        "size": MAX_ANOMALY_HITS,
        "track_total_hits": true,
        "query": {
            "bool": {
                "filter": [
                    { "term": { "account": account } },
                    { "term": { "abnormal": true } },
                    { "range": { "date": {
                        "gte": from.format("%Y-%m-%d").to_string(),
                        "lte": to.format("%Y-%m-%d").to_string(),
                        "format": "yyyy-MM-dd"
                    } } }
                ]
            }
        },
        "sort": [{ "date": { "order": "asc" } }]
    })
}

/// Reads the `products → days → cost` aggregation into one series per product.
pub fn parse_cost_aggregation(response: &Value) -> Result<Vec<ProductSeries>> {
    let products = response
        .pointer("/aggregations/products/buckets")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("aggregations.products.buckets"))?;

    products
        .iter()
        .map(|product| -> Result<ProductSeries> {
            let code = product
                .get("key")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed("product bucket key"))?;
            let days = product
                .pointer("/days/buckets")
                .and_then(Value::as_array)
                .ok_or_else(|| malformed("days.buckets"))?;

            let points = days
                .iter()
                .map(parse_day_bucket)
                .collect::<Result<Vec<_>>>()?;
            Ok(ProductSeries::new(code, points))
        })
        .collect()
}

fn parse_day_bucket(bucket: &Value) -> Result<CostPoint> {
    let millis = bucket
        .get("key")
        .and_then(Value::as_i64)
        .ok_or_else(|| malformed("day bucket key"))?;
    let date = DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| malformed("day bucket key out of range"))?
        .date_naive();
    let cost = bucket
        .pointer("/cost/value")
        .and_then(Value::as_f64)
        .ok_or_else(|| malformed("day bucket cost.value"))?;
    Ok(CostPoint::new(date, cost))
}

/// Reads search hits back into documents with their ids.
pub fn parse_anomaly_hits(response: &Value) -> Result<Vec<StoredAnomaly>> {
    let hits = response
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("hits.hits"))?;

    hits.iter()
        .map(|hit| -> Result<StoredAnomaly> {
            let id = hit
                .get("_id")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed("hit _id"))?
                .to_string();
            let source = hit.get("_source").cloned().ok_or_else(|| malformed("hit _source"))?;
            let document: AnomalyDocument = serde_json::from_value(source)?;
            Ok(StoredAnomaly { id, document })
        })
        .collect()
}

/// Number of documents matching a search, `hits.total.value`.
pub fn total_hits(response: &Value) -> Option<u64> {
    response.pointer("/hits/total/value").and_then(Value::as_u64)
}

/// NDJSON body indexing every document under its id.
pub fn bulk_body(index: &str, batch: &[StoredAnomaly]) -> Result<String> {
    let mut body = String::new();
    for anomaly in batch {
        let action = json!({ "index": { "_index": index, "_id": anomaly.id } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&anomaly.document)?);
        body.push('\n');
    }
    Ok(body)
}

/// Fails when any item of a bulk response reports an error.
pub fn check_bulk_response(response: &Value) -> Result<()> {
    if !response.get("errors").and_then(Value::as_bool).unwrap_or(false) {
        return Ok(());
    }

    let reason = response
        .get("items")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|item| item.pointer("/index/error/reason").and_then(Value::as_str))
        .next()
        .unwrap_or("unknown reason");
    Err(Error::Bulk(reason.to_string()))
}

fn malformed(what: &str) -> Error {
    Error::MalformedResponse(format!("missing or invalid {}", what))
}
