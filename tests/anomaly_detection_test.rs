//! 異常検知パイプラインの統合テスト

mod fixtures;

use cost_anomaly_rs::analytics::anomaly::{AnomalyCandidate, AnomalyMetadata};
use cost_anomaly_rs::store::{AnomalyDocument, StoredAnomaly};
use cost_anomaly_rs::{AnomalyDetectionRunner, Error};
use fixtures::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_flat_costs_produce_no_anomalies() {
    let store = new_store();
    seed(&store, "AmazonEC2", 100.0, &[]).await;
    seed(&store, "AmazonS3", 20.0, &[]).await;

    let summary = runner(&store)
        .run_detection_at(ACCOUNT, today(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.products, 2);
    assert_eq!(summary.candidates, 0);
    assert_eq!(summary.persisted, 0);
    assert!(store.anomalies(ACCOUNT).await.is_empty());
}

#[tokio::test]
async fn test_spike_is_persisted() {
    let store = new_store();
    seed(&store, "AmazonEC2", 100.0, &[(day(2020, 2, 10), 1000.0)]).await;
    seed(&store, "AmazonS3", 50.0, &[]).await;

    let summary = runner(&store)
        .run_detection_at(ACCOUNT, today(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.candidates, 1);
    assert_eq!(summary.suppressed, 0);
    assert_eq!(summary.persisted, 1);
    assert_eq!(summary.recurrent, 0);

    let stored = store.anomalies(ACCOUNT).await;
    assert_eq!(stored.len(), 1);
    let doc = &stored[0].document;
    assert_eq!(doc.account, ACCOUNT);
    assert_eq!(doc.date, "2020-02-10T00:00:00Z");
    assert_eq!(doc.product(), "AmazonEC2");
    assert!(doc.abnormal);
    assert!(!doc.recurrent);
    assert_eq!(doc.cost.value, 1000.0);
    assert_eq!(doc.cost.max_expected, 100.0);
    assert_eq!(stored[0].id, doc.document_id().unwrap());
}

#[tokio::test]
async fn test_negligible_increase_is_suppressed() {
    let store = new_store();
    seed(&store, "AmazonEC2", 1000.0, &[]).await;
    // +30 against a daily bill of 1040 is below 5%
    seed(&store, "AmazonS3", 10.0, &[(day(2020, 2, 10), 40.0)]).await;

    let summary = runner(&store)
        .run_detection_at(ACCOUNT, today(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.candidates, 1);
    assert_eq!(summary.suppressed, 1);
    assert_eq!(summary.persisted, 0);
}

async fn podium_case(spike: f64) -> usize {
    let store = new_store();
    seed(&store, "AmazonEC2", 1000.0, &[]).await;
    seed(&store, "AmazonRDS", 900.0, &[]).await;
    seed(&store, "AmazonS3", 800.0, &[]).await;
    seed(&store, "AWSLambda", 100.0, &[(day(2020, 2, 10), spike)]).await;

    let summary = runner(&store)
        .run_detection_at(ACCOUNT, today(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.candidates, 1);
    summary.persisted
}

#[tokio::test]
async fn test_spike_outside_podium_is_suppressed() {
    // 700 ranks fourth behind 1000, 900 and 800
    assert_eq!(podium_case(700.0).await, 0);
}

#[tokio::test]
async fn test_spike_on_podium_is_kept() {
    // 850 pushes S3 (800) off the podium
    assert_eq!(podium_case(850.0).await, 1);
}

#[tokio::test]
async fn test_new_product_is_compared_against_zero_spend() {
    let store = new_store();
    seed(&store, "AmazonEC2", 1000.0, &[]).await;
    let first_day = day(2020, 2, 10);
    store
        .add_daily_costs(ACCOUNT, "AmazonSageMaker", first_day, &[200.0; 11])
        .await;

    runner(&store)
        .run_detection_at(ACCOUNT, today(), &CancellationToken::new())
        .await
        .unwrap();

    let dates: BTreeSet<String> = store
        .anomalies(ACCOUNT)
        .await
        .into_iter()
        .map(|a| a.document.date)
        .collect();
    assert_eq!(dates.iter().next().map(String::as_str), Some("2020-02-10T00:00:00Z"));
}

fn january_anomaly(cost: f64) -> StoredAnomaly {
    let candidate = AnomalyCandidate {
        metadata: AnomalyMetadata::product("AmazonEC2"),
        date: day(2020, 1, 15),
        cost,
        upper_band: 100.0,
    };
    StoredAnomaly::identified(AnomalyDocument::from_candidate(ACCOUNT, &candidate)).unwrap()
}

#[tokio::test]
async fn test_monthly_recurrence_is_marked() {
    let store = new_store();
    store.insert_anomaly(january_anomaly(480.0)).await;
    seed(&store, "AmazonEC2", 100.0, &[(day(2020, 2, 15), 500.0)]).await;

    let summary = runner(&store)
        .run_detection_at(ACCOUNT, today(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.persisted, 1);
    assert_eq!(summary.recurrent, 1);

    let stored = store.anomalies(ACCOUNT).await;
    let february = stored
        .iter()
        .find(|a| a.document.date == "2020-02-15T00:00:00Z")
        .unwrap();
    let january = stored
        .iter()
        .find(|a| a.document.date == "2020-01-15T00:00:00Z")
        .unwrap();
    assert!(february.document.recurrent);
    assert_eq!(february.document.cost.value, 500.0);
    assert!(!january.document.recurrent);
}

#[tokio::test]
async fn test_recurrence_outside_tolerance_is_not_marked() {
    let store = new_store();
    store.insert_anomaly(january_anomaly(300.0)).await;
    seed(&store, "AmazonEC2", 100.0, &[(day(2020, 2, 15), 500.0)]).await;

    let summary = runner(&store)
        .run_detection_at(ACCOUNT, today(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.recurrent, 0);
    assert!(store.anomalies(ACCOUNT).await.iter().all(|a| !a.document.recurrent));
}

#[tokio::test]
async fn test_rerun_upserts_instead_of_duplicating() {
    let store = new_store();
    seed(
        &store,
        "AmazonEC2",
        100.0,
        &[(day(2020, 1, 28), 900.0), (day(2020, 2, 12), 1200.0)],
    )
    .await;
    let runner = runner(&store);
    let token = CancellationToken::new();

    runner.run_detection_at(ACCOUNT, today(), &token).await.unwrap();
    let first = store.anomalies(ACCOUNT).await;
    runner.run_detection_at(ACCOUNT, today(), &token).await.unwrap();
    let second = store.anomalies(ACCOUNT).await;

    assert_eq!(first.len(), 2);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_rerun_keeps_recurrent_flag() {
    let store = new_store();
    store.insert_anomaly(january_anomaly(480.0)).await;
    seed(&store, "AmazonEC2", 100.0, &[(day(2020, 2, 15), 500.0)]).await;
    let runner = runner(&store);
    let token = CancellationToken::new();

    let first_summary = runner.run_detection_at(ACCOUNT, today(), &token).await.unwrap();
    let first = store.anomalies(ACCOUNT).await;
    // persisting resets the flag to false before recurrence marks it again
    let second_summary = runner.run_detection_at(ACCOUNT, today(), &token).await.unwrap();
    let second = store.anomalies(ACCOUNT).await;

    assert_eq!(first_summary, second_summary);
    assert_eq!(second_summary.recurrent, 1);
    assert_eq!(first.len(), 2);
    assert_eq!(first, second);

    let february = second
        .iter()
        .find(|a| a.document.date == "2020-02-15T00:00:00Z")
        .unwrap();
    assert!(february.document.recurrent);
}

#[tokio::test]
async fn test_missing_billing_data_is_not_an_error() {
    let store = new_store();

    let summary = runner(&store)
        .run_detection_at(ACCOUNT, today(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.account, ACCOUNT);
    assert_eq!(summary.products, 0);
    assert_eq!(summary.persisted, 0);
}

#[tokio::test]
async fn test_cancelled_run_fails() {
    let store = new_store();
    seed(&store, "AmazonEC2", 100.0, &[(day(2020, 2, 10), 1000.0)]).await;
    let token = CancellationToken::new();
    token.cancel();

    let result = runner(&store).run_detection_at(ACCOUNT, today(), &token).await;

    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(store.anomalies(ACCOUNT).await.is_empty());
}

#[tokio::test]
async fn test_bulk_failure_keeps_earlier_batches() {
    let store = new_store();
    seed(
        &store,
        "AmazonEC2",
        100.0,
        &[(day(2020, 2, 5), 1000.0), (day(2020, 2, 15), 1000.0)],
    )
    .await;
    let failing = Arc::new(FailingStore::new(store.clone(), 1));

    let result = AnomalyDetectionRunner::new(store.clone(), failing.clone(), detection_config())
        .with_bulk_batch_size(1)
        .run_detection_at(ACCOUNT, today(), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(Error::Bulk(_))));
    assert_eq!(failing.batches_written(), 1);
    assert_eq!(store.anomalies(ACCOUNT).await.len(), 1);
}
