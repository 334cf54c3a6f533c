//! One async operation per remote compute call.
//!
//! Each function submits a single finished expression graph through the
//! [`EarthEngine`] backend and decodes the remote-computed result. Nothing
//! here retries or folds errors; callers own that policy.

use chrono::DateTime;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::expr::{self, Expr, CAPTURE_TIME_PROPERTY, NDVI_BAND_NAME};
use super::{EarthEngine, ExportFormat, RemoteError};
use crate::geometry::AreaOfInterest;

/// Catalog metadata for one image, as returned by evaluating an image
/// expression.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub bands: Vec<BandInfo>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BandInfo {
    pub id: String,
}

impl ImageInfo {
    pub fn band_names(&self) -> Vec<String> {
        self.bands.iter().map(|b| b.id.clone()).collect()
    }

    /// Capture date (UTC) derived from the `system:time_start` property.
    pub fn capture_date(&self) -> Option<String> {
        let millis = self.properties.get(CAPTURE_TIME_PROPERTY)?.as_f64()?;
        let timestamp = DateTime::from_timestamp_millis(millis as i64)?;
        Some(timestamp.format("%Y-%m-%d").to_string())
    }
}

pub async fn collection_size<B: EarthEngine>(ee: &B, collection: &Expr) -> Result<u64, RemoteError> {
    let value = ee.compute(&expr::collection_size(collection)).await?;
    value
        .as_u64()
        .ok_or_else(|| RemoteError::Decode(format!("collection size is not an integer: {value}")))
}

/// Mean NDVI over the AOI. A missing or empty remote result is treated as
/// zero, matching the well-defined "no data" outcome.
pub async fn mean_index_over_area<B: EarthEngine>(
    ee: &B,
    index: &Expr,
    aoi: &AreaOfInterest,
    scale_m: u32,
) -> Result<f64, RemoteError> {
    let value = ee.compute(&expr::mean_region(index, aoi, scale_m)).await?;
    Ok(value
        .get(NDVI_BAND_NAME)
        .and_then(Value::as_f64)
        .unwrap_or(0.0))
}

/// Vectorize a binary mask to a GeoJSON FeatureCollection.
pub async fn vectorize<B: EarthEngine>(
    ee: &B,
    mask: &Expr,
    aoi: &AreaOfInterest,
    scale_m: u32,
) -> Result<Value, RemoteError> {
    let value = ee
        .compute(&expr::reduce_to_vectors(mask, aoi, scale_m))
        .await?;
    if value.get("features").and_then(Value::as_array).is_none() {
        return Err(RemoteError::Decode(
            "vectorize response is not a FeatureCollection".to_string(),
        ));
    }
    Ok(value)
}

/// Remote-computed spheroidal area of one feature geometry, in m².
pub async fn feature_area<B: EarthEngine>(ee: &B, geometry: &Value) -> Result<f64, RemoteError> {
    let value = ee.compute(&expr::geometry_area(geometry)).await?;
    value
        .as_f64()
        .ok_or_else(|| RemoteError::Decode(format!("geometry area is not a number: {value}")))
}

/// The `count` most recent images of a collection, newest first.
pub async fn take_recent<B: EarthEngine>(
    ee: &B,
    collection: &Expr,
    count: u32,
) -> Result<Vec<ImageInfo>, RemoteError> {
    let sorted = expr::sort_by_recency(collection);
    let value = ee.compute(&expr::to_list(&sorted, count)).await?;
    serde_json::from_value(value)
        .map_err(|e| RemoteError::Decode(format!("image list has unexpected shape: {e}")))
}

/// URL of a rendered PNG thumbnail of a visualized image.
pub async fn render_thumbnail<B: EarthEngine>(
    ee: &B,
    image: &Expr,
    dimensions: u32,
) -> Result<String, RemoteError> {
    ee.export_url(&expr::visualize(image), ExportFormat::Png { dimensions })
        .await
}

/// URL of a full-resolution GeoTIFF download of an image.
pub async fn render_download<B: EarthEngine>(
    ee: &B,
    image: &Expr,
    scale_m: u32,
) -> Result<String, RemoteError> {
    ee.export_url(image, ExportFormat::GeoTiff { scale_m }).await
}
