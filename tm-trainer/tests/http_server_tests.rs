//! HTTP Server & Routing Integration Tests

mod helpers;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use helpers::TestHarness;
use http_body_util::BodyExt;
use serde_json::Value;
use tm_trainer::build_router;
use tower::ServiceExt;

const BOUNDARY: &str = "tm-test-boundary";

/// Multipart body from `(field, file name, bytes)` parts
fn multipart(parts: &[(&str, Option<&str>, &[u8])]) -> Body {
    let mut body = Vec::new();
    for (field, filename, bytes) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match filename {
            Some(name) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: image/jpeg\r\n\r\n",
                    field, name
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", field).as_bytes(),
            ),
        }
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    Body::from(body)
}

fn multipart_request(uri: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(body)
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_health_endpoint() {
    let harness = TestHarness::new().await;
    let app = build_router(harness.state.clone());

    let (status, json) = send_json(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "tm-trainer");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["active_jobs"], 0);
}

#[tokio::test]
async fn test_upload_files_by_class_prefix() {
    let harness = TestHarness::new().await;
    let app = build_router(harness.state.clone());

    let body = multipart(&[
        ("files[]", Some("cat_001.jpg"), b"c1"),
        ("files[]", Some("cat_002.jpg"), b"c2"),
        ("files[]", Some("dog_001.jpg"), b"d1"),
    ]);
    let (status, json) = send_json(&app, multipart_request("/upload", body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Files uploaded successfully");
    assert_eq!(json["classes"]["cat"], 2);
    assert_eq!(json["classes"]["dog"], 1);

    let stored = harness.dir.path().join("uploads").join("cat").join("cat_002.jpg");
    assert_eq!(std::fs::read(stored).unwrap(), b"c2");
}

#[tokio::test]
async fn test_upload_without_files_is_bad_request() {
    let harness = TestHarness::new().await;
    let app = build_router(harness.state.clone());

    let (status, json) = send_json(&app, multipart_request("/upload", multipart(&[]))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_upload_without_class_prefix_is_bad_request() {
    let harness = TestHarness::new().await;
    let app = build_router(harness.state.clone());

    let body = multipart(&[("files[]", Some("nolabel.jpg"), b"x")]);
    let (status, _) = send_json(&app, multipart_request("/upload", body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_train_accepts_and_streams_progress() {
    let harness = TestHarness::new().await;
    harness.seed_class("cat", 3).await;
    harness.seed_class("dog", 3).await;
    let app = build_router(harness.state.clone());

    let (status, json) = send_json(
        &app,
        json_request(
            "POST",
            "/train",
            serde_json::json!({ "classes": ["cat", "dog"], "enhance_images": "off" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["state"], "CREATED");
    let job_id = json["job_id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, get(&format!("/train/{}/events", job_id))).await;
    assert_eq!(status, StatusCode::OK);

    let text = String::from_utf8(body).unwrap();
    let frames: Vec<Value> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect();

    assert_eq!(frames.first().unwrap()["status"], "Project created successfully");
    let last = frames.last().unwrap();
    assert_eq!(last["status"], "Model trained and published successfully!");
    assert!(last["project_id"].is_string());
    assert!(last["iteration_id"].is_string());
    assert!(frames.iter().all(|f| f.get("error").is_none()));

    // Stream already consumed
    let (status, json) = send_json(&app, get(&format!("/train/{}/events", job_id))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");

    let (status, json) = send_json(&app, get(&format!("/train/{}", job_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "COMPLETED");

    let (status, json) = send_json(&app, get("/reference")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["project_id"], last["project_id"]);
}

#[tokio::test]
async fn test_train_with_missing_class_images_is_bad_request() {
    let harness = TestHarness::new().await;
    let app = build_router(harness.state.clone());

    let (status, json) = send_json(
        &app,
        json_request("POST", "/train", serde_json::json!({ "classes": ["cat"] })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("cat"));
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let harness = TestHarness::new().await;
    let app = build_router(harness.state.clone());
    let job_id = uuid::Uuid::new_v4();

    let (status, _) = send_json(&app, get(&format!("/train/{}", job_id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send_json(
        &app,
        json_request("POST", &format!("/train/{}/cancel", job_id), Value::Null),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_predict_before_training_is_not_found() {
    let harness = TestHarness::new().await;
    let app = build_router(harness.state.clone());

    let body = multipart(&[("image", Some("query.jpg"), b"jpeg")]);
    let (status, json) = send_json(&app, multipart_request("/predict", body)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "Model not trained yet");

    let (status, _) = send_json(&app, get("/reference")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_predict_without_image_is_bad_request() {
    let harness = TestHarness::new().await;
    let app = build_router(harness.state.clone());

    let body = multipart(&[("enhance_images", None, b"off")]);
    let (status, json) = send_json(&app, multipart_request("/predict", body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "No image provided");
}

#[tokio::test]
async fn test_predict_returns_confidences() {
    let harness = TestHarness::new().await;
    harness.seed_class("cat", 1).await;
    harness.provider.set_predictions(vec![tm_trainer::services::Prediction {
        tag_name: "cat".into(),
        probability: 0.5,
    }]);
    let app = build_router(harness.state.clone());

    let (status, json) = send_json(
        &app,
        json_request("POST", "/train", serde_json::json!({ "classes": ["cat"] })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = json["job_id"].as_str().unwrap().to_string();
    send(&app, get(&format!("/train/{}/events", job_id))).await;

    let body = multipart(&[
        ("image", Some("query.jpg"), b"jpeg"),
        ("enhance_images", None, b"off"),
    ]);
    let (status, json) = send_json(&app, multipart_request("/predict", body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["predictions"][0]["class"], "cat");
    assert_eq!(json["predictions"][0]["confidence"], 50.0);
}
