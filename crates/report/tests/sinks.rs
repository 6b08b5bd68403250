//! Report sinks against an in-memory object store and a local axum webhook.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::NaiveDate;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use tokio::sync::Mutex;

use gapfill_core::config::NotifyOn;
use gapfill_core::{Product, Provenance, Region, SceneKey, SceneQuery, SceneRecord, SceneSet, TileId};
use gapfill_reconcile::{reconcile, ReconcileOptions};
use gapfill_report::{ObjectStoreSink, Report, ReportEmitter, ReportPublisher, ReportSink, RunContext, WebhookSink};
use gapfill_storage::StorageBackend;

type Received = Arc<Mutex<Vec<serde_json::Value>>>;

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    format!("http://{addr}")
}

async fn webhook(status: StatusCode) -> (String, Received) {
    async fn handler(
        State((received, status)): State<(Received, StatusCode)>,
        Json(body): Json<serde_json::Value>,
    ) -> StatusCode {
        received.lock().await.push(body);
        status
    }

    let received = Received::default();
    let app = Router::new()
        .route("/hook", post(handler))
        .with_state((received.clone(), status));
    (format!("{}/hook", serve(app).await), received)
}

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// `missing` provider-only scenes, one shared scene.
fn report(emitter: &ReportEmitter, missing: u16) -> Report {
    let key = |row: u16| SceneKey::new(Product::Landsat8, TileId::path_row(172, row), Some(d("2023-01-02")), "C2L2");
    let provider: SceneSet = (0..=missing).map(|row| SceneRecord::new(key(row), Provenance::Provider)).collect();
    let indexed: SceneSet = [SceneRecord::new(key(0), Provenance::Indexed)].into_iter().collect();
    let query = SceneQuery::new(Product::Landsat8, "2023-01-01..2023-01-31".parse().unwrap(), Region::named("africa"));
    let result = reconcile(&query, provider, indexed, &ReconcileOptions::new(3), d("2023-01-10"));
    emitter.gap_report(&result, &RunContext::new("DEV")).into()
}

#[tokio::test]
async fn object_store_sink_writes_report_json() {
    let backend = StorageBackend::memory();
    let sink = ObjectStoreSink::new(backend.clone(), "status-report");
    let emitter = ReportEmitter::new(200);
    let report = report(&emitter, 2);
    let alert = emitter.alert(&report).unwrap();

    let location = sink.deliver(&report, &alert).await.unwrap().unwrap();
    let key = sink.key_for(&report);
    assert!(key.starts_with("status-report/landsat_8_"));
    assert!(key.ends_with("_gap_report.json"));
    assert_eq!(location, format!("memory:///{key}"));

    let object = backend.store().get(&ObjectPath::from(key.as_str())).await.unwrap();
    let stored: serde_json::Value = serde_json::from_slice(&object.bytes().await.unwrap()).unwrap();
    assert_eq!(stored["counts"]["gaps"], 2);
    assert_eq!(stored["schema_version"], 1);
}

#[tokio::test]
async fn object_store_sink_skips_empty_reports() {
    let sink = ObjectStoreSink::new(StorageBackend::memory(), "status-report");
    let emitter = ReportEmitter::new(200);
    let report = report(&emitter, 0);
    let alert = emitter.alert(&report).unwrap();
    assert_eq!(sink.deliver(&report, &alert).await.unwrap(), None);
}

#[tokio::test]
async fn webhook_fires_only_past_threshold() {
    let (url, received) = webhook(StatusCode::OK).await;
    let sink = WebhookSink::new(url, NotifyOn::Threshold, Duration::from_secs(5)).unwrap();
    let emitter = ReportEmitter::new(2);

    let quiet = report(&emitter, 2);
    sink.deliver(&quiet, &emitter.alert(&quiet).unwrap()).await.unwrap();
    assert!(received.lock().await.is_empty());

    let loud = report(&emitter, 3);
    sink.deliver(&loud, &emitter.alert(&loud).unwrap()).await.unwrap();
    let bodies = received.lock().await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["threshold_exceeded"], true);
    assert_eq!(bodies[0]["gaps"], 3);
    assert_eq!(bodies[0]["schema_version"], 1);
}

#[tokio::test]
async fn webhook_always_mode_and_error_status() {
    let (url, received) = webhook(StatusCode::INTERNAL_SERVER_ERROR).await;
    let sink = WebhookSink::new(url, NotifyOn::Always, Duration::from_secs(5)).unwrap();
    let emitter = ReportEmitter::new(200);
    let r = report(&emitter, 1);

    let err = sink.deliver(&r, &emitter.alert(&r).unwrap()).await.unwrap_err();
    assert!(matches!(err, gapfill_report::ReportError::Status { status: 500, .. }));
    assert_eq!(received.lock().await.len(), 1);
}

#[tokio::test]
async fn publisher_links_stored_report_in_webhook() {
    let (url, received) = webhook(StatusCode::OK).await;
    let sinks: Vec<Box<dyn ReportSink>> = vec![
        Box::new(ObjectStoreSink::new(StorageBackend::memory(), "status-report")),
        Box::new(WebhookSink::new(url, NotifyOn::Always, Duration::from_secs(5)).unwrap()),
    ];
    let publisher = ReportPublisher::new(ReportEmitter::new(200), sinks);
    let mut r = report(publisher.emitter(), 1);

    let results = publisher.publish(&mut r).await;
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|res| res.success));

    let location = r.location().unwrap().to_string();
    assert!(location.starts_with("memory:///status-report/"));
    let bodies = received.lock().await;
    assert_eq!(bodies[0]["report_uri"], location.as_str());
    assert!(bodies[0]["text"].as_str().unwrap().contains(&location));
}

#[tokio::test]
async fn publisher_continues_after_sink_failure() {
    let (bad_url, _) = webhook(StatusCode::BAD_GATEWAY).await;
    let (good_url, received) = webhook(StatusCode::OK).await;
    let sinks: Vec<Box<dyn ReportSink>> = vec![
        Box::new(WebhookSink::new(bad_url, NotifyOn::Always, Duration::from_secs(5)).unwrap()),
        Box::new(WebhookSink::new(good_url, NotifyOn::Always, Duration::from_secs(5)).unwrap()),
    ];
    let publisher = ReportPublisher::new(ReportEmitter::new(200), sinks);
    let mut r = report(publisher.emitter(), 1);

    let results = publisher.publish(&mut r).await;
    assert!(!results[0].success);
    assert!(results[0].error.as_deref().unwrap().contains("502"));
    assert!(results[1].success);
    assert_eq!(received.lock().await.len(), 1);
}
