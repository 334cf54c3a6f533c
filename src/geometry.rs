//! Area-of-interest polygon handling.
//!
//! An [`AreaOfInterest`] is a single closed ring of WGS84 (longitude,
//! latitude) pairs. Validation happens here, at the service boundary, so
//! malformed rings never reach the remote compute service.

use serde_json::{json, Value};
use thiserror::Error;

/// Minimum number of points in a closed ring (a triangle plus the closing
/// point).
pub const MIN_RING_POINTS: usize = 4;

/// Meters per degree of latitude, and of longitude at the equator.
const METERS_PER_DEG_LON: f64 = 111_320.0;
const METERS_PER_DEG_LAT: f64 = 110_540.0;

/// Ground sampling distance of the imagery bands used for rendering, in
/// meters per pixel.
pub const RENDER_SCALE_M: f64 = 10.0;

/// Thumbnail size limits in pixels (longer side).
pub const THUMBNAIL_MIN_PX: u32 = 32;
pub const THUMBNAIL_MAX_PX: u32 = 512;

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("polygon has no rings")]
    NoRings,
    #[error("polygon ring needs at least {MIN_RING_POINTS} points, got {0}")]
    TooFewPoints(usize),
    #[error("polygon ring is not closed (first and last points differ)")]
    RingNotClosed,
    #[error("coordinate ({lon}, {lat}) is outside WGS84 bounds")]
    CoordinateOutOfRange { lon: f64, lat: f64 },
}

/// Axis-aligned bounding box of an AOI, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

/// A validated closed polygon ring over which analysis is performed.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaOfInterest {
    ring: Vec<[f64; 2]>,
}

impl AreaOfInterest {
    /// Build an AOI from GeoJSON-style polygon coordinates
    /// (`[[[lon, lat], ...], ...]`). Only the outer ring is analyzed.
    pub fn from_rings(rings: &[Vec<[f64; 2]>]) -> Result<Self, GeometryError> {
        let ring = rings.first().ok_or(GeometryError::NoRings)?;
        if ring.len() < MIN_RING_POINTS {
            return Err(GeometryError::TooFewPoints(ring.len()));
        }
        if ring.first() != ring.last() {
            return Err(GeometryError::RingNotClosed);
        }
        for &[lon, lat] in ring {
            if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
                return Err(GeometryError::CoordinateOutOfRange { lon, lat });
            }
        }
        Ok(Self { ring: ring.clone() })
    }

    /// The validated outer ring.
    pub fn ring(&self) -> &[[f64; 2]] {
        &self.ring
    }

    pub fn bounds(&self) -> Bounds {
        let mut b = Bounds {
            min_lon: f64::INFINITY,
            min_lat: f64::INFINITY,
            max_lon: f64::NEG_INFINITY,
            max_lat: f64::NEG_INFINITY,
        };
        for &[lon, lat] in &self.ring {
            b.min_lon = b.min_lon.min(lon);
            b.min_lat = b.min_lat.min(lat);
            b.max_lon = b.max_lon.max(lon);
            b.max_lat = b.max_lat.max(lat);
        }
        b
    }

    /// The bounding box as a closed five-point ring, the shape the change
    /// report carries.
    pub fn bounds_ring(&self) -> Vec<[f64; 2]> {
        let b = self.bounds();
        vec![
            [b.min_lon, b.min_lat],
            [b.max_lon, b.min_lat],
            [b.max_lon, b.max_lat],
            [b.min_lon, b.max_lat],
            [b.min_lon, b.min_lat],
        ]
    }

    /// GeoJSON `Polygon` value, the geometry encoding the remote service
    /// accepts in expressions.
    pub fn to_geojson(&self) -> Value {
        json!({
            "type": "Polygon",
            "coordinates": [self.ring],
        })
    }

    /// Thumbnail size in pixels for this AOI: the approximate ground
    /// footprint at 10 m/pixel, clamped to [32, 512] on the longer side.
    pub fn thumbnail_dimension(&self) -> u32 {
        let b = self.bounds();
        let mid_lat = (b.min_lat + b.max_lat) / 2.0;
        let width_m = METERS_PER_DEG_LON * (b.max_lon - b.min_lon).abs() * mid_lat.to_radians().cos();
        let height_m = METERS_PER_DEG_LAT * (b.max_lat - b.min_lat).abs();
        let dim = (width_m.max(height_m) / RENDER_SCALE_M) as u32;
        dim.clamp(THUMBNAIL_MIN_PX, THUMBNAIL_MAX_PX)
    }
}
