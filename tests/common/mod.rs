#![allow(dead_code)]

use plotwatch::geometry::AreaOfInterest;
use serde_json::{json, Value};

/// Closed five-point ring roughly 1 km on a side.
pub fn km_square_ring() -> Vec<[f64; 2]> {
    vec![
        [11.40, 44.50],
        [11.41, 44.50],
        [11.41, 44.51],
        [11.40, 44.51],
        [11.40, 44.50],
    ]
}

pub fn km_square_aoi() -> AreaOfInterest {
    AreaOfInterest::from_rings(&[km_square_ring()]).unwrap()
}

/// Catalog entry shaped like an evaluated image expression.
pub fn catalog_image(id: &str, time_start_ms: i64) -> Value {
    json!({
        "id": id,
        "bands": [{"id": "B2"}, {"id": "B3"}, {"id": "B4"}, {"id": "B8"}, {"id": "SCL"}],
        "properties": {
            "system:time_start": time_start_ms,
            "CLOUDY_PIXEL_PERCENTAGE": 12.5,
        },
    })
}
