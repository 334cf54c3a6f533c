//! End-to-end tests of the HTTP surface with a programmed backend behind
//! the real router.

mod common;

use std::sync::Arc;

use common::{catalog_image, km_square_ring};
use plotwatch::ee::mock::MockEarthEngine;
use plotwatch::server::{create_router, AppState};
use serde_json::{json, Value};

async fn spawn_server(ee: MockEarthEngine) -> String {
    let state = Arc::new(AppState { ee });
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn detect_body() -> Value {
    json!({
        "plotId": "plot-7",
        "coordinates": [km_square_ring()],
    })
}

#[tokio::test]
async fn health_check_is_independent_of_the_backend() {
    // Even a backend that fails every call leaves the probe green.
    let base = spawn_server(MockEarthEngine::failing(500, "down")).await;

    let response = reqwest::get(format!("{base}/health-check")).await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn detect_change_round_trip_with_defaults() {
    let ee = MockEarthEngine::new()
        .with_sizes([3, 2, 1])
        .with_means([Some(0.5), Some(0.3)])
        .with_grids(vec![0.5], vec![0.1], 100.0);
    let base = spawn_server(ee).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/detect-change"))
        .json(&detect_body())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    for key in [
        "plotId",
        "change_detected",
        "change_area",
        "change_geojson",
        "bounding_box",
        "percentChange",
    ] {
        assert!(body.get(key).is_some(), "response is missing {key}");
    }
    assert_eq!(body["plotId"], "plot-7");
    assert_eq!(body["change_detected"], json!(true));
    assert_eq!(body["change_area"], json!(0.01));
    assert_eq!(body["percentChange"], json!(20.0));
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn detect_change_rejects_an_open_ring() {
    let base = spawn_server(MockEarthEngine::new()).await;
    let body = json!({
        "plotId": "plot-7",
        "coordinates": [[[11.40, 44.50], [11.41, 44.50], [11.41, 44.51], [11.40, 44.51]]],
    });

    let response = reqwest::Client::new()
        .post(format!("{base}/detect-change"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["plotId"], "plot-7");
    assert!(body["error"].as_str().unwrap().contains("not closed"));
}

#[tokio::test]
async fn detect_change_rejects_non_positive_threshold() {
    let base = spawn_server(MockEarthEngine::new()).await;
    let mut body = detect_body();
    body["threshold"] = json!(0.0);

    let response = reqwest::Client::new()
        .post(format!("{base}/detect-change"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("threshold"));
}

#[tokio::test]
async fn detect_change_folds_remote_failure_into_the_body() {
    let base = spawn_server(MockEarthEngine::failing(429, "Quota exceeded.")).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/detect-change"))
        .json(&detect_body())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["plotId"], "plot-7");
    assert_eq!(body["change_detected"], json!(false));
    assert_eq!(body["change_area"], json!(0.0));
    assert_eq!(body["bounding_box"], json!([]));
    assert!(body["error"].as_str().unwrap().contains("Quota exceeded."));
}

#[tokio::test]
async fn malformed_body_yields_a_structured_error() {
    let base = spawn_server(MockEarthEngine::new()).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/detect-change"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().starts_with("invalid request body"));
}

#[tokio::test]
async fn latest_image_reports_an_empty_catalog() {
    let base = spawn_server(MockEarthEngine::new()).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/latest-image"))
        .json(&detect_body())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["plotId"], "plot-7");
    assert!(!body["error"].as_str().unwrap().is_empty());
    assert!(body.get("best_thumbnail_url").is_none());
}

#[tokio::test]
async fn latest_image_returns_a_thumbnail_url() {
    let ee = MockEarthEngine::new()
        .with_images(vec![catalog_image(
            "COPERNICUS/S2_SR_HARMONIZED/newest",
            1_717_200_000_000,
        )])
        .with_export_urls(["https://earthengine.example.test/thumb/xyz:getPixels".to_string()]);
    let base = spawn_server(ee).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/latest-image?relax_mask=false&apply_mask=true"))
        .json(&detect_body())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body["best_thumbnail_url"],
        "https://earthengine.example.test/thumb/xyz:getPixels"
    );
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn download_latest_image_lists_references() {
    let ee = MockEarthEngine::new().with_images(vec![
        catalog_image("COPERNICUS/S2_SR_HARMONIZED/a", 1_717_200_000_000),
        catalog_image("COPERNICUS/S2_SR_HARMONIZED/b", 1_716_600_000_000),
    ]);
    let base = spawn_server(ee).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/download-latest-image?apply_mask=false"))
        .json(&detect_body())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    let images = body["images"].as_array().unwrap();
    assert_eq!(images.len(), 2);
    for image in images {
        for key in ["id", "date", "bands", "properties", "download_url"] {
            assert!(image.get(key).is_some(), "image reference missing {key}");
        }
    }
    assert_eq!(images[0]["id"], "COPERNICUS/S2_SR_HARMONIZED/a");
}

#[tokio::test]
async fn unknown_routes_return_structured_json() {
    let base = spawn_server(MockEarthEngine::new()).await;

    let response = reqwest::get(format!("{base}/nope")).await.unwrap();
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert!(body.get("error").is_some());
}
