use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use tower::util::ServiceExt;

pub async fn request(app: &Router, method: Method, path: &str, body: Option<Value>) -> Response {
    let builder = Request::builder().method(method).uri(path);

    let req = if let Some(payload) = body {
        builder
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("empty body")
    };

    app.clone().oneshot(req).await.expect("oneshot response")
}

pub async fn response_json(resp: Response) -> (StatusCode, HeaderMap, Value) {
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body bytes");

    let json = if bytes.is_empty() {
        json!({})
    } else {
        serde_json::from_slice::<Value>(&bytes).expect("parse json body")
    };

    (status, headers, json)
}

pub async fn send(app: &Router, method: Method, path: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, _, json) = response_json(request(app, method, path, body).await).await;
    (status, json)
}

pub fn assert_json_error(body: &Value, code: &str) {
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], code);
    assert!(body.get("message").is_some());
}

pub fn assert_status_ok_json(status: StatusCode, body: &Value) {
    assert!(status.is_success());
    assert_eq!(body["success"], true);
    assert!(body.get("data").is_some());
}

/// Record body in the wire shape clients post after a capture.
pub fn record_body(participant_id: &str, stage: &str, hrv: f64, fatigue: f64) -> Value {
    json!({
        "participantId": participant_id,
        "stage": stage,
        "expression": {
            "AU1": 0.5, "AU4": 1.0, "AU6": 0.8, "AU12": 2.0,
            "AU15": 0.2, "AU17": 0.4, "AU20": 1.1, "AU24": 0.9
        },
        "pulse": { "heartRate": 74.0, "hrv": hrv, "respirationRate": 15.0 },
        "complexion": { "homogeneity": 82.0, "redness": 24.0, "roughness": 30.0, "vitality": 77.2 },
        "gaze": { "blinkRate": 14.0, "pupilUnrest": 2.0, "stability": 84.0, "fatigueIndex": fatigue },
        "selfReport": "feeling a bit tense"
    })
}

pub async fn create_record(app: &Router, body: Value) -> String {
    let (status, json) = send(app, Method::POST, "/api/records", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {json}");
    json["data"]["handle"]
        .as_str()
        .expect("handle in response")
        .to_string()
}
