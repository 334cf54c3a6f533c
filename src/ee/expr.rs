//! Expression-graph builders for the remote compute service.
//!
//! Every query the service runs is described to Earth Engine as a graph of
//! function invocations over constants. The builders here are pure: they
//! construct the graph nodes and never touch the network. One remote
//! operation (see [`crate::ee::ops`]) submits one finished graph.

use serde_json::{json, Map, Value};

use crate::geometry::AreaOfInterest;
use crate::masking::MaskingPolicy;

/// Imagery catalog the service analyzes.
pub const S2_COLLECTION_ID: &str = "COPERNICUS/S2_SR_HARMONIZED";

/// Scene classification band carrying per-pixel class codes.
pub const SCL_BAND: &str = "SCL";

/// Near-infrared and red bands, the NDVI inputs.
pub const NDVI_BANDS: [&str; 2] = ["B8", "B4"];
pub const NDVI_BAND_NAME: &str = "NDVI";

/// True-color bands and value range used for rendering.
pub const VISUAL_BANDS: [&str; 3] = ["B4", "B3", "B2"];
pub const VISUAL_RANGE: (f64, f64) = (0.0, 3000.0);

/// Catalog property holding per-image cloud coverage.
pub const CLOUD_COVER_PROPERTY: &str = "CLOUDY_PIXEL_PERCENTAGE";

/// Catalog property holding the capture timestamp (epoch milliseconds).
pub const CAPTURE_TIME_PROPERTY: &str = "system:time_start";

/// Remote-side pixel budget for vectorization.
pub const MAX_VECTORIZE_PIXELS: f64 = 1e8;

/// One node of a remote compute expression graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr(Value);

impl Expr {
    /// A literal value node.
    pub fn constant(value: Value) -> Self {
        Expr(json!({ "constantValue": value }))
    }

    fn invoke(name: &str, args: Vec<(&str, Value)>) -> Self {
        let mut arguments = Map::new();
        for (key, value) in args {
            arguments.insert(key.to_string(), value);
        }
        Expr(json!({
            "functionInvocationValue": {
                "functionName": name,
                "arguments": Value::Object(arguments),
            }
        }))
    }

    fn argument(name: &str) -> Self {
        Expr(json!({ "argumentReference": name }))
    }

    fn function(argument_names: &[&str], body: Expr) -> Self {
        Expr(json!({
            "functionDefinitionValue": {
                "argumentNames": argument_names,
                "body": body.0,
            }
        }))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

/// The Sentinel-2 surface-reflectance catalog.
pub fn s2_collection() -> Expr {
    Expr::invoke(
        "ImageCollection.load",
        vec![("id", Expr::constant(json!(S2_COLLECTION_ID)).into_value())],
    )
}

pub fn filter_bounds(collection: &Expr, aoi: &AreaOfInterest) -> Expr {
    Expr::invoke(
        "ImageCollection.filterBounds",
        vec![
            ("collection", collection.clone().into_value()),
            ("geometry", Expr::constant(aoi.to_geojson()).into_value()),
        ],
    )
}

/// Restrict a collection to captures in `[start, end)`. Timestamps are
/// RFC 3339 strings.
pub fn filter_date(collection: &Expr, start: &str, end: &str) -> Expr {
    Expr::invoke(
        "ImageCollection.filterDate",
        vec![
            ("collection", collection.clone().into_value()),
            ("start", Expr::constant(json!(start)).into_value()),
            ("end", Expr::constant(json!(end)).into_value()),
        ],
    )
}

pub fn filter_cloud_cover_lt(collection: &Expr, max_percent: f64) -> Expr {
    let filter = Expr::invoke(
        "Filter.lessThan",
        vec![
            ("name", Expr::constant(json!(CLOUD_COVER_PROPERTY)).into_value()),
            ("value", Expr::constant(json!(max_percent)).into_value()),
        ],
    );
    Expr::invoke(
        "Collection.filter",
        vec![
            ("collection", collection.clone().into_value()),
            ("filter", filter.into_value()),
        ],
    )
}

/// Mask one image per the policy: `Disabled` only clips to the AOI, the
/// other policies drop the policy's SCL classes first.
pub fn mask_image(image: Expr, aoi: &AreaOfInterest, policy: MaskingPolicy) -> Expr {
    let classes = policy.excluded_classes();
    if classes.is_empty() {
        return clip(image, aoi);
    }
    let scl = Expr::invoke(
        "Image.select",
        vec![
            ("image", image.clone().into_value()),
            ("bands", Expr::constant(json!([SCL_BAND])).into_value()),
        ],
    );
    let mut mask: Option<Expr> = None;
    for &class in classes {
        let not_class = Expr::invoke(
            "Image.neq",
            vec![
                ("image1", scl.clone().into_value()),
                ("image2", constant_image(f64::from(class)).into_value()),
            ],
        );
        mask = Some(match mask {
            None => not_class,
            Some(acc) => Expr::invoke(
                "Image.and",
                vec![
                    ("image1", acc.into_value()),
                    ("image2", not_class.into_value()),
                ],
            ),
        });
    }
    let masked = Expr::invoke(
        "Image.updateMask",
        vec![
            ("image", image.into_value()),
            ("mask", mask.expect("non-empty class set").into_value()),
        ],
    );
    clip(masked, aoi)
}

/// Apply [`mask_image`] to every image in a collection.
pub fn map_mask(collection: &Expr, aoi: &AreaOfInterest, policy: MaskingPolicy) -> Expr {
    let body = mask_image(Expr::argument("image"), aoi, policy);
    Expr::invoke(
        "ImageCollection.map",
        vec![
            ("collection", collection.clone().into_value()),
            ("function", Expr::function(&["image"], body).into_value()),
        ],
    )
}

/// Pixel-wise median composite of a collection.
pub fn median(collection: &Expr) -> Expr {
    Expr::invoke(
        "ImageCollection.median",
        vec![("collection", collection.clone().into_value())],
    )
}

/// Normalized difference of NIR and red, renamed `NDVI`. Domain [-1, 1].
pub fn ndvi(image: &Expr) -> Expr {
    let nd = Expr::invoke(
        "Image.normalizedDifference",
        vec![
            ("image", image.clone().into_value()),
            ("bandNames", Expr::constant(json!(NDVI_BANDS)).into_value()),
        ],
    );
    Expr::invoke(
        "Image.rename",
        vec![
            ("image", nd.into_value()),
            ("names", Expr::constant(json!([NDVI_BAND_NAME])).into_value()),
        ],
    )
}

/// Mean of an index image over the AOI at the given scale.
pub fn mean_region(image: &Expr, aoi: &AreaOfInterest, scale_m: u32) -> Expr {
    Expr::invoke(
        "Image.reduceRegion",
        vec![
            ("image", image.clone().into_value()),
            ("reducer", Expr::invoke("Reducer.mean", vec![]).into_value()),
            ("geometry", Expr::constant(aoi.to_geojson()).into_value()),
            ("scale", Expr::constant(json!(scale_m)).into_value()),
        ],
    )
}

/// Binary mask image: true where `|b - a| > threshold`, self-masked so
/// vectorization only sees positive pixels.
pub fn abs_difference_gt(a: &Expr, b: &Expr, threshold: f64) -> Expr {
    let diff = Expr::invoke(
        "Image.subtract",
        vec![
            ("image1", b.clone().into_value()),
            ("image2", a.clone().into_value()),
        ],
    );
    let abs = Expr::invoke("Image.abs", vec![("image", diff.into_value())]);
    let flagged = Expr::invoke(
        "Image.gt",
        vec![
            ("image1", abs.into_value()),
            ("image2", constant_image(threshold).into_value()),
        ],
    );
    Expr::invoke("Image.selfMask", vec![("image", flagged.into_value())])
}

/// Convert positive-mask regions to polygon features.
pub fn reduce_to_vectors(image: &Expr, aoi: &AreaOfInterest, scale_m: u32) -> Expr {
    Expr::invoke(
        "Image.reduceToVectors",
        vec![
            ("image", image.clone().into_value()),
            ("geometry", Expr::constant(aoi.to_geojson()).into_value()),
            ("scale", Expr::constant(json!(scale_m)).into_value()),
            ("geometryType", Expr::constant(json!("polygon")).into_value()),
            ("eightConnected", Expr::constant(json!(false)).into_value()),
            ("maxPixels", Expr::constant(json!(MAX_VECTORIZE_PIXELS)).into_value()),
        ],
    )
}

/// Order a collection by capture time, most recent first.
pub fn sort_by_recency(collection: &Expr) -> Expr {
    Expr::invoke(
        "Collection.limit",
        vec![
            ("collection", collection.clone().into_value()),
            ("key", Expr::constant(json!(CAPTURE_TIME_PROPERTY)).into_value()),
            ("ascending", Expr::constant(json!(false)).into_value()),
        ],
    )
}

/// The first `count` images of a collection, as a list.
pub fn to_list(collection: &Expr, count: u32) -> Expr {
    Expr::invoke(
        "Collection.toList",
        vec![
            ("collection", collection.clone().into_value()),
            ("count", Expr::constant(json!(count)).into_value()),
        ],
    )
}

pub fn collection_size(collection: &Expr) -> Expr {
    Expr::invoke(
        "Collection.size",
        vec![("collection", collection.clone().into_value())],
    )
}

pub fn load_image(id: &str) -> Expr {
    Expr::invoke(
        "Image.load",
        vec![("id", Expr::constant(json!(id)).into_value())],
    )
}

/// RGB rendering of an image with the service's true-color parameters.
pub fn visualize(image: &Expr) -> Expr {
    Expr::invoke(
        "Image.visualize",
        vec![
            ("image", image.clone().into_value()),
            ("bands", Expr::constant(json!(VISUAL_BANDS)).into_value()),
            ("min", Expr::constant(json!(VISUAL_RANGE.0)).into_value()),
            ("max", Expr::constant(json!(VISUAL_RANGE.1)).into_value()),
        ],
    )
}

/// Spheroidal area of a geometry in square meters.
pub fn geometry_area(geometry: &Value) -> Expr {
    Expr::invoke(
        "Geometry.area",
        vec![
            ("geometry", Expr::constant(geometry.clone()).into_value()),
            ("maxError", Expr::constant(json!(1)).into_value()),
        ],
    )
}

fn clip(image: Expr, aoi: &AreaOfInterest) -> Expr {
    Expr::invoke(
        "Image.clip",
        vec![
            ("image", image.into_value()),
            ("geometry", Expr::constant(aoi.to_geojson()).into_value()),
        ],
    )
}

fn constant_image(value: f64) -> Expr {
    Expr::invoke(
        "Image.constant",
        vec![("value", Expr::constant(json!(value)).into_value())],
    )
}
