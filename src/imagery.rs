//! Latest-imagery lookups: thumbnail and download references for the most
//! recent cloud-free captures over an AOI.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::ee::ops::ImageInfo;
use crate::ee::{expr, ops, EarthEngine, RemoteError};
use crate::geometry::AreaOfInterest;
use crate::masking::MaskingPolicy;

/// Catalog quality threshold: images at or above this cloud percentage are
/// not considered.
pub const MAX_CLOUD_PERCENT: f64 = 40.0;

/// How many recent candidates are fetched per lookup.
pub const RECENT_IMAGE_COUNT: u32 = 3;

/// Ground sampling distance of download renders, meters per pixel.
pub const DOWNLOAD_SCALE_M: u32 = 10;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("No recent cloud-free images found.")]
    NoImages,
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Downloadable reference to one catalog image.
#[derive(Debug, Clone, Serialize)]
pub struct ImageReference {
    pub id: String,
    /// Capture date as `YYYY-MM-DD`, when the catalog carries a timestamp.
    pub date: Option<String>,
    pub bands: Vec<String>,
    pub properties: Map<String, Value>,
    pub download_url: String,
}

/// The most recent qualifying captures over the AOI, newest first.
async fn recent_candidates<B: EarthEngine>(
    ee: &B,
    aoi: &AreaOfInterest,
) -> Result<Vec<ImageInfo>, RemoteError> {
    let catalog = expr::filter_cloud_cover_lt(
        &expr::filter_bounds(&expr::s2_collection(), aoi),
        MAX_CLOUD_PERCENT,
    );
    ops::take_recent(ee, &catalog, RECENT_IMAGE_COUNT).await
}

fn image_id(info: &ImageInfo) -> Result<&str, RemoteError> {
    info.id
        .as_deref()
        .ok_or_else(|| RemoteError::Decode("catalog entry is missing an image id".to_string()))
}

/// Thumbnail URL for the most recent qualifying image, masked per policy
/// and rendered as true color at the AOI's footprint resolution.
pub async fn latest_thumbnail<B: EarthEngine>(
    ee: &B,
    aoi: &AreaOfInterest,
    policy: MaskingPolicy,
) -> Result<String, LookupError> {
    let candidates = recent_candidates(ee, aoi).await?;
    let newest = candidates.first().ok_or(LookupError::NoImages)?;
    let masked = expr::mask_image(expr::load_image(image_id(newest)?), aoi, policy);
    let url = ops::render_thumbnail(ee, &masked, aoi.thumbnail_dimension()).await?;
    Ok(url)
}

/// Download references for the most recent qualifying images, newest
/// first, each rendered as a full-resolution GeoTIFF.
pub async fn latest_downloads<B: EarthEngine>(
    ee: &B,
    aoi: &AreaOfInterest,
    policy: MaskingPolicy,
) -> Result<Vec<ImageReference>, LookupError> {
    let candidates = recent_candidates(ee, aoi).await?;
    if candidates.is_empty() {
        return Err(LookupError::NoImages);
    }
    let mut references = Vec::with_capacity(candidates.len());
    for info in &candidates {
        let id = image_id(info)?;
        let masked = expr::mask_image(expr::load_image(id), aoi, policy);
        let download_url = ops::render_download(ee, &masked, DOWNLOAD_SCALE_M).await?;
        references.push(ImageReference {
            id: id.to_string(),
            date: info.capture_date(),
            bands: info.band_names(),
            properties: info.properties.clone(),
            download_url,
        });
    }
    Ok(references)
}
