//! Change-detection orchestration.
//!
//! One call sequences the remote operations for one polygon over one time
//! window: build the masked catalog, composite the before/after halves,
//! compare their vegetation indexes, and vectorize the flagged pixels.
//! "Too little imagery" is a well-defined terminal result, not an error;
//! remote failures surface as `Err` for the API layer to fold.

use chrono::{Duration, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::ee::{expr, ops, EarthEngine, RemoteError};
use crate::geometry::AreaOfInterest;
use crate::masking::MaskingPolicy;

/// Scale in meters at which indexes are reduced and masks vectorized.
pub const ANALYSIS_SCALE_M: u32 = 10;

/// Minimum images in the lookback window for a comparison to be possible.
const MIN_WINDOW_IMAGES: u64 = 2;

/// Caller-tunable detection parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParams {
    /// Absolute NDVI delta above which a pixel counts as changed.
    pub threshold: f64,
    /// Length of the lookback window in days.
    pub days: i64,
    /// Mask only clouds and shadows instead of the strict class set.
    pub relax_mask: bool,
    /// Disable SCL masking entirely when false.
    pub apply_mask: bool,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            threshold: 0.2,
            days: 20,
            relax_mask: false,
            apply_mask: true,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ParamsError {
    #[error("threshold must be positive, got {0}")]
    Threshold(f64),
    #[error("days must be positive, got {0}")]
    Days(i64),
}

impl DetectionParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if !(self.threshold > 0.0) {
            return Err(ParamsError::Threshold(self.threshold));
        }
        if self.days <= 0 {
            return Err(ParamsError::Days(self.days));
        }
        Ok(())
    }

    pub fn policy(&self) -> MaskingPolicy {
        MaskingPolicy::from_flags(self.relax_mask, self.apply_mask)
    }
}

/// Outcome of one change-detection run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChangeReport {
    pub change_detected: bool,
    /// Total flagged area in hectares, rounded to 4 decimals.
    pub change_area: f64,
    /// FeatureCollection of flagged regions; `{}` when none were computed.
    pub change_geojson: Value,
    /// Closed ring of the AOI's bounding box; empty on failure.
    pub bounding_box: Vec<Vec<[f64; 2]>>,
    /// Absolute mean-index delta as a percentage, rounded to 2 decimals.
    #[serde(rename = "percentChange")]
    pub percent_change: f64,
}

impl ChangeReport {
    /// The terminal result for a window with too little imagery.
    pub fn insufficient_data(aoi: &AreaOfInterest) -> Self {
        Self {
            change_detected: false,
            change_area: 0.0,
            change_geojson: json!({}),
            bounding_box: vec![aoi.bounds_ring()],
            percent_change: 0.0,
        }
    }

    /// The zeroed body a failed run is reported with.
    pub fn failed() -> Self {
        Self {
            change_detected: false,
            change_area: 0.0,
            change_geojson: json!({}),
            bounding_box: Vec::new(),
            percent_change: 0.0,
        }
    }
}

/// Run change detection for one AOI over `[now - days, now]`.
pub async fn detect_change<B: EarthEngine>(
    ee: &B,
    aoi: &AreaOfInterest,
    params: &DetectionParams,
) -> Result<ChangeReport, RemoteError> {
    let now = Utc::now();
    let start = now - Duration::days(params.days);
    let mid = start + Duration::days(params.days / 2);
    let stamp = |t: chrono::DateTime<Utc>| t.to_rfc3339_opts(SecondsFormat::Secs, true);

    let catalog = expr::filter_date(
        &expr::filter_bounds(&expr::s2_collection(), aoi),
        &stamp(start),
        &stamp(now),
    );
    let masked = expr::map_mask(&catalog, aoi, params.policy());

    if ops::collection_size(ee, &masked).await? < MIN_WINDOW_IMAGES {
        return Ok(ChangeReport::insufficient_data(aoi));
    }

    let before = expr::filter_date(&masked, &stamp(start), &stamp(mid));
    let after = expr::filter_date(&masked, &stamp(mid), &stamp(now));
    if ops::collection_size(ee, &before).await? == 0 || ops::collection_size(ee, &after).await? == 0
    {
        return Ok(ChangeReport::insufficient_data(aoi));
    }

    let index_before = expr::ndvi(&expr::median(&before));
    let index_after = expr::ndvi(&expr::median(&after));
    let mean_before = ops::mean_index_over_area(ee, &index_before, aoi, ANALYSIS_SCALE_M).await?;
    let mean_after = ops::mean_index_over_area(ee, &index_after, aoi, ANALYSIS_SCALE_M).await?;
    let percent_change = round_dp((mean_after - mean_before).abs() * 100.0, 2);

    let delta = expr::abs_difference_gt(&index_before, &index_after, params.threshold);
    let change_geojson = ops::vectorize(ee, &delta, aoi, ANALYSIS_SCALE_M).await?;

    let features = change_geojson
        .get("features")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut total_area_m2 = 0.0;
    for feature in &features {
        if let Some(geometry) = feature.get("geometry") {
            total_area_m2 += ops::feature_area(ee, geometry).await?;
        }
    }

    Ok(ChangeReport {
        change_detected: !features.is_empty(),
        change_area: round_dp(total_area_m2 / 10_000.0, 4),
        change_geojson,
        bounding_box: vec![aoi.bounds_ring()],
        percent_change,
    })
}

pub(crate) fn round_dp(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
