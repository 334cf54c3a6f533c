//! Change-detection orchestrator behavior over a programmed backend.

mod common;

use common::km_square_aoi;
use plotwatch::detect::{detect_change, DetectionParams};
use plotwatch::ee::mock::MockEarthEngine;
use plotwatch::ee::RemoteError;
use serde_json::json;

#[tokio::test]
async fn empty_catalog_is_insufficient_data_not_an_error() {
    let aoi = km_square_aoi();
    let ee = MockEarthEngine::new().with_sizes([0]);

    let report = detect_change(&ee, &aoi, &DetectionParams::default())
        .await
        .unwrap();

    assert!(!report.change_detected);
    assert_eq!(report.change_area, 0.0);
    assert_eq!(report.change_geojson, json!({}));
    assert_eq!(report.percent_change, 0.0);
    assert_eq!(report.bounding_box, vec![aoi.bounds_ring()]);
}

#[tokio::test]
async fn empty_before_subset_is_insufficient_data() {
    let aoi = km_square_aoi();
    let ee = MockEarthEngine::new().with_sizes([3, 0]);

    let report = detect_change(&ee, &aoi, &DetectionParams::default())
        .await
        .unwrap();
    assert!(!report.change_detected);
    assert_eq!(report.bounding_box, vec![aoi.bounds_ring()]);
}

#[tokio::test]
async fn empty_after_subset_is_insufficient_data() {
    let aoi = km_square_aoi();
    let ee = MockEarthEngine::new().with_sizes([3, 2, 0]);

    let report = detect_change(&ee, &aoi, &DetectionParams::default())
        .await
        .unwrap();
    assert!(!report.change_detected);
    assert_eq!(report.change_area, 0.0);
}

#[tokio::test]
async fn reports_flagged_cells_and_mean_shift() {
    let aoi = km_square_aoi();
    let ee = MockEarthEngine::new()
        .with_sizes([4, 2, 2])
        .with_means([Some(0.6), Some(0.3)])
        .with_grids(
            vec![0.6, 0.6, 0.6, 0.6],
            vec![0.1, 0.6, 0.6, 0.6],
            100.0,
        );

    let report = detect_change(&ee, &aoi, &DetectionParams::default())
        .await
        .unwrap();

    assert!(report.change_detected);
    assert_eq!(report.change_area, 0.01);
    assert_eq!(report.percent_change, 30.0);
    let features = report.change_geojson["features"].as_array().unwrap();
    assert_eq!(features.len(), 1);
    assert_eq!(report.bounding_box, vec![aoi.bounds_ring()]);
}

#[tokio::test]
async fn missing_region_mean_counts_as_zero() {
    let aoi = km_square_aoi();
    let ee = MockEarthEngine::new()
        .with_sizes([2, 1, 1])
        .with_means([None, Some(0.25)])
        .with_grids(vec![0.5, 0.5], vec![0.5, 0.5], 100.0);

    let report = detect_change(&ee, &aoi, &DetectionParams::default())
        .await
        .unwrap();

    assert!(!report.change_detected);
    assert_eq!(report.percent_change, 25.0);
    assert_eq!(report.change_area, 0.0);
}

#[tokio::test]
async fn flagged_area_shrinks_as_threshold_rises() {
    let aoi = km_square_aoi();
    let before = vec![0.5, 0.5, 0.5, 0.5];
    let after = vec![0.45, 0.2, 0.0, 0.95];

    let run = |threshold: f64| {
        let before = before.clone();
        let after = after.clone();
        let aoi = aoi.clone();
        async move {
            let ee = MockEarthEngine::new()
                .with_sizes([4, 2, 2])
                .with_means([Some(0.5), Some(0.4)])
                .with_grids(before, after, 100.0);
            let params = DetectionParams {
                threshold,
                ..DetectionParams::default()
            };
            detect_change(&ee, &aoi, &params).await.unwrap()
        }
    };

    let loose = run(0.2).await;
    let tight = run(0.4).await;

    let loose_count = loose.change_geojson["features"].as_array().unwrap().len();
    let tight_count = tight.change_geojson["features"].as_array().unwrap().len();
    assert_eq!(loose_count, 3);
    assert_eq!(tight_count, 2);
    assert!(loose.change_area > tight.change_area);
}

#[tokio::test]
async fn change_area_reproduces_from_returned_features() {
    let aoi = km_square_aoi();
    let cell_area = 137.25;
    let ee = MockEarthEngine::new()
        .with_sizes([4, 2, 2])
        .with_means([Some(0.6), Some(0.2)])
        .with_grids(vec![0.6, 0.6, 0.6], vec![0.1, 0.1, 0.6], cell_area);

    let report = detect_change(&ee, &aoi, &DetectionParams::default())
        .await
        .unwrap();

    let count = report.change_geojson["features"].as_array().unwrap().len();
    let expected = (count as f64 * cell_area / 10_000.0 * 10_000.0).round() / 10_000.0;
    assert_eq!(report.change_area, expected);
}

#[tokio::test]
async fn remote_rejection_surfaces_as_error() {
    let aoi = km_square_aoi();
    let ee = MockEarthEngine::failing(429, "Quota exceeded.");

    let err = detect_change(&ee, &aoi, &DetectionParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Api { status: 429, .. }));
}
