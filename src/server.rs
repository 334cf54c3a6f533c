//! HTTP API layer.
//!
//! Stateless handlers over the orchestrators. Every handler returns a
//! structured JSON object: validation failures are 400s with an `error`
//! field, remote failures are folded into 200 bodies carrying `error`, so
//! callers always receive a diagnosable payload of the documented shape.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::detect::{self, ChangeReport, DetectionParams};
use crate::ee::EarthEngine;
use crate::geometry::AreaOfInterest;
use crate::imagery::{self, ImageReference};
use crate::masking::MaskingPolicy;

/// Process-wide state: the authenticated compute backend, injected once at
/// startup.
pub struct AppState<B: EarthEngine> {
    pub ee: B,
}

#[derive(Debug, Deserialize)]
pub struct DetectRequest {
    #[serde(rename = "plotId")]
    plot_id: String,
    /// GeoJSON-style polygon coordinates `[[[lon, lat], ...]]`.
    coordinates: Vec<Vec<[f64; 2]>>,
    #[serde(default = "default_threshold")]
    threshold: f64,
    #[serde(default = "default_days")]
    days: i64,
    #[serde(default)]
    relax_mask: bool,
    #[serde(default = "default_true")]
    apply_mask: bool,
}

#[derive(Debug, Deserialize)]
pub struct PlotRequest {
    #[serde(rename = "plotId")]
    plot_id: String,
    coordinates: Vec<Vec<[f64; 2]>>,
}

/// Masking flags for the imagery lookup endpoints. Both default to true.
#[derive(Debug, Deserialize)]
pub struct MaskQuery {
    #[serde(default = "default_true")]
    relax_mask: bool,
    #[serde(default = "default_true")]
    apply_mask: bool,
}

impl MaskQuery {
    fn policy(&self) -> MaskingPolicy {
        MaskingPolicy::from_flags(self.relax_mask, self.apply_mask)
    }
}

fn default_threshold() -> f64 {
    0.2
}

fn default_days() -> i64 {
    20
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
struct DetectResponse {
    #[serde(rename = "plotId")]
    plot_id: String,
    #[serde(flatten)]
    report: ChangeReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ThumbnailResponse {
    #[serde(rename = "plotId")]
    plot_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    best_thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct DownloadsResponse {
    #[serde(rename = "plotId")]
    plot_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<ImageReference>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn bad_request(plot_id: &str, message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "plotId": plot_id, "error": message })),
    )
        .into_response()
}

fn malformed_body(rejection: JsonRejection) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": format!("invalid request body: {rejection}") })),
    )
        .into_response()
}

async fn detect_change_handler<B: EarthEngine + 'static>(
    State(state): State<Arc<AppState<B>>>,
    payload: Result<Json<DetectRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(body) => body,
        Err(rejection) => return malformed_body(rejection),
    };

    let aoi = match AreaOfInterest::from_rings(&request.coordinates) {
        Ok(aoi) => aoi,
        Err(e) => return bad_request(&request.plot_id, e.to_string()),
    };
    let params = DetectionParams {
        threshold: request.threshold,
        days: request.days,
        relax_mask: request.relax_mask,
        apply_mask: request.apply_mask,
    };
    if let Err(e) = params.validate() {
        return bad_request(&request.plot_id, e.to_string());
    }

    let response = match detect::detect_change(&state.ee, &aoi, &params).await {
        Ok(report) => DetectResponse {
            plot_id: request.plot_id,
            report,
            error: None,
        },
        Err(e) => {
            warn!("change detection failed for plot {}: {e}", request.plot_id);
            DetectResponse {
                plot_id: request.plot_id,
                report: ChangeReport::failed(),
                error: Some(e.to_string()),
            }
        }
    };
    Json(response).into_response()
}

async fn latest_image_handler<B: EarthEngine + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Query(mask): Query<MaskQuery>,
    payload: Result<Json<PlotRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(body) => body,
        Err(rejection) => return malformed_body(rejection),
    };
    let aoi = match AreaOfInterest::from_rings(&request.coordinates) {
        Ok(aoi) => aoi,
        Err(e) => return bad_request(&request.plot_id, e.to_string()),
    };

    let response = match imagery::latest_thumbnail(&state.ee, &aoi, mask.policy()).await {
        Ok(url) => ThumbnailResponse {
            plot_id: request.plot_id,
            best_thumbnail_url: Some(url),
            error: None,
        },
        Err(e) => {
            warn!("thumbnail lookup failed for plot {}: {e}", request.plot_id);
            ThumbnailResponse {
                plot_id: request.plot_id,
                best_thumbnail_url: None,
                error: Some(e.to_string()),
            }
        }
    };
    Json(response).into_response()
}

async fn download_latest_image_handler<B: EarthEngine + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Query(mask): Query<MaskQuery>,
    payload: Result<Json<PlotRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(body) => body,
        Err(rejection) => return malformed_body(rejection),
    };
    let aoi = match AreaOfInterest::from_rings(&request.coordinates) {
        Ok(aoi) => aoi,
        Err(e) => return bad_request(&request.plot_id, e.to_string()),
    };

    let response = match imagery::latest_downloads(&state.ee, &aoi, mask.policy()).await {
        Ok(images) => DownloadsResponse {
            plot_id: request.plot_id,
            images: Some(images),
            error: None,
        },
        Err(e) => {
            warn!("download lookup failed for plot {}: {e}", request.plot_id);
            DownloadsResponse {
                plot_id: request.plot_id,
                images: None,
                error: Some(e.to_string()),
            }
        }
    };
    Json(response).into_response()
}

/// Liveness probe; never touches the remote service.
async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "no such endpoint" })),
    )
        .into_response()
}

async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    tracing::info!(
        "{} {} -> {} - {:.1}ms",
        method,
        path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64() * 1000.0
    );
    response
}

pub fn create_router<B: EarthEngine + 'static>(state: Arc<AppState<B>>) -> Router {
    Router::new()
        .route("/detect-change", post(detect_change_handler::<B>))
        .route("/latest-image", post(latest_image_handler::<B>))
        .route(
            "/download-latest-image",
            post(download_latest_image_handler::<B>),
        )
        .route("/health-check", get(health_check))
        .fallback(not_found)
        .with_state(state)
        .layer(middleware::from_fn(logging_middleware))
}
