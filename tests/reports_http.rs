mod common;

use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use common::app::{spawn_test_app, spawn_test_app_without_reports};
use common::http::{assert_json_error, assert_status_ok_json, create_record, record_body, send};

fn delta<'a>(report: &'a Value, metric: &str) -> &'a Value {
    report["deltas"]
        .as_array()
        .unwrap()
        .iter()
        .find(|d| d["metric"] == metric)
        .unwrap()
}

#[tokio::test]
async fn it_compare_before_and_after() {
    let app = spawn_test_app().await;
    let before = create_record(&app.app, record_body("p-r", "before", 40.0, 55.0)).await;
    let after = create_record(&app.app, record_body("p-r", "after", 50.0, 40.0)).await;

    let (status, body) = send(
        &app.app,
        Method::POST,
        "/api/reports",
        Some(json!({ "participantId": "p-r", "before": before, "after": after })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let report = &body["data"];
    assert_eq!(report["before"], before.as_str());
    assert_eq!(report["after"], after.as_str());
    // 8 个有方向的指标中 2 个改善
    assert_eq!(report["report"]["score"], 25.0);
    assert_eq!(report["deltas"].as_array().unwrap().len(), 16);
    assert_eq!(delta(report, "hrv")["delta"], 10.0);
    assert_eq!(delta(report, "hrv")["improved"], true);
    assert_eq!(delta(report, "fatigueIndex")["improved"], true);
    assert_eq!(delta(report, "AU12")["improved"], Value::Null);
}

#[tokio::test]
async fn it_latest_report_recomputes_deltas() {
    let app = spawn_test_app().await;
    let before = create_record(&app.app, record_body("p-latest", "before", 40.0, 55.0)).await;
    let after = create_record(&app.app, record_body("p-latest", "after", 30.0, 70.0)).await;

    let (status, _) = send(
        &app.app,
        Method::POST,
        "/api/reports",
        Some(json!({ "participantId": "p-latest", "before": before, "after": after })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app.app, Method::GET, "/api/reports/p-latest/latest", None).await;
    assert_status_ok_json(status, &body);
    let report = &body["data"];
    assert_eq!(report["participantId"], "p-latest");
    assert_eq!(report["report"]["score"], 0.0);
    assert_eq!(delta(report, "hrv")["improved"], false);
    assert_eq!(delta(report, "heartRate")["delta"], 0.0);
}

#[tokio::test]
async fn it_baseline_only_report() {
    let app = spawn_test_app().await;
    let before = create_record(&app.app, record_body("p-base", "before", 40.0, 55.0)).await;

    let (status, body) = send(
        &app.app,
        Method::POST,
        "/api/reports",
        Some(json!({ "participantId": "p-base", "before": before })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["report"]["score"], 50.0);
    assert_eq!(body["data"]["report"]["headline"], "Mock baseline");
    assert_eq!(body["data"]["after"], Value::Null);
}

#[tokio::test]
async fn it_disabled_backend_gives_neutral_report() {
    let app = spawn_test_app_without_reports().await;
    let before = create_record(&app.app, record_body("p-n", "before", 40.0, 55.0)).await;

    let (status, body) = send(
        &app.app,
        Method::POST,
        "/api/reports",
        Some(json!({ "participantId": "p-n", "before": before })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let report = &body["data"]["report"];
    assert_eq!(report["score"], 50.0);
    assert_eq!(report["headline"], "Analysis temporarily limited");
    assert_eq!(report["observations"][0], "Compatibility mode");
}

#[tokio::test]
async fn it_compare_rejects_swapped_stages() {
    let app = spawn_test_app().await;
    let before = create_record(&app.app, record_body("p-s", "before", 40.0, 55.0)).await;
    let after = create_record(&app.app, record_body("p-s", "after", 50.0, 40.0)).await;

    let (status, body) = send(
        &app.app,
        Method::POST,
        "/api/reports",
        Some(json!({ "participantId": "p-s", "before": after, "after": before })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_json_error(&body, "STAGE_MISMATCH");
}

#[tokio::test]
async fn it_compare_rejects_foreign_record() {
    let app = spawn_test_app().await;
    let before = create_record(&app.app, record_body("owner", "before", 40.0, 55.0)).await;

    let (status, body) = send(
        &app.app,
        Method::POST,
        "/api/reports",
        Some(json!({ "participantId": "intruder", "before": before })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_json_error(&body, "PARTICIPANT_MISMATCH");
}

#[tokio::test]
async fn it_missing_record_and_report_are_404() {
    let app = spawn_test_app().await;

    let (status, body) = send(
        &app.app,
        Method::POST,
        "/api/reports",
        Some(json!({ "participantId": "p-x", "before": "does-not-exist" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_json_error(&body, "RECORD_NOT_FOUND");

    let (status, body) = send(&app.app, Method::GET, "/api/reports/p-x/latest", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_json_error(&body, "REPORT_NOT_FOUND");
}
