//! In-memory compute backend with programmed responses, for tests.
//!
//! Scalar answers (collection sizes, region means) are consumed in call
//! order. Vectorization is evaluated against a pair of synthetic index
//! grids so threshold behavior can be exercised without a remote service:
//! cell `i` is flagged when `|after[i] - before[i]|` exceeds the threshold
//! embedded in the submitted expression, and each flagged cell becomes one
//! unit-square feature with a fixed area.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde_json::{json, Value};

use super::expr::NDVI_BAND_NAME;
use super::{EarthEngine, ExportFormat, Expr, RemoteError};

#[derive(Debug, Default)]
pub struct MockEarthEngine {
    sizes: Mutex<VecDeque<u64>>,
    means: Mutex<VecDeque<Option<f64>>>,
    grids: Option<GridPair>,
    images: Vec<Value>,
    export_urls: Mutex<VecDeque<String>>,
    export_counter: AtomicU64,
    failure: Option<(u16, String)>,
}

#[derive(Debug, Clone)]
struct GridPair {
    before: Vec<f64>,
    after: Vec<f64>,
    cell_area_m2: f64,
}

impl MockEarthEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend whose every call fails with the given remote rejection.
    pub fn failing(status: u16, message: &str) -> Self {
        Self {
            failure: Some((status, message.to_string())),
            ..Self::default()
        }
    }

    /// Successive answers to collection-size queries.
    pub fn with_sizes(self, sizes: impl IntoIterator<Item = u64>) -> Self {
        *self.sizes.lock().unwrap() = sizes.into_iter().collect();
        self
    }

    /// Successive answers to region-mean queries; `None` models a band with
    /// no unmasked pixels.
    pub fn with_means(self, means: impl IntoIterator<Item = Option<f64>>) -> Self {
        *self.means.lock().unwrap() = means.into_iter().collect();
        self
    }

    /// Index grids backing vectorization, plus the area reported for each
    /// flagged cell.
    pub fn with_grids(mut self, before: Vec<f64>, after: Vec<f64>, cell_area_m2: f64) -> Self {
        assert_eq!(before.len(), after.len(), "grid lengths must match");
        self.grids = Some(GridPair {
            before,
            after,
            cell_area_m2,
        });
        self
    }

    /// Catalog entries answered to take-recent queries, newest first.
    pub fn with_images(mut self, images: Vec<Value>) -> Self {
        self.images = images;
        self
    }

    /// Successive export URLs; a generated placeholder is used once these
    /// run out.
    pub fn with_export_urls(self, urls: impl IntoIterator<Item = String>) -> Self {
        *self.export_urls.lock().unwrap() = urls.into_iter().collect();
        self
    }

    fn check_failure(&self) -> Result<(), RemoteError> {
        match &self.failure {
            Some((status, message)) => Err(RemoteError::Api {
                status: *status,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn vectorize(&self, expr: &Expr) -> Result<Value, RemoteError> {
        let grids = self
            .grids
            .as_ref()
            .ok_or_else(|| RemoteError::Decode("mock has no grids configured".to_string()))?;
        let threshold = threshold_of(expr.as_value())
            .ok_or_else(|| RemoteError::Decode("expression has no threshold".to_string()))?;
        let features: Vec<Value> = grids
            .before
            .iter()
            .zip(&grids.after)
            .enumerate()
            .filter(|(_, (b, a))| (*a - *b).abs() > threshold)
            .map(|(i, _)| cell_feature(i))
            .collect();
        Ok(json!({ "type": "FeatureCollection", "features": features }))
    }
}

/// Unit-square feature for flagged cell `i`.
fn cell_feature(i: usize) -> Value {
    let x = i as f64;
    json!({
        "type": "Feature",
        "properties": { "label": 1 },
        "geometry": {
            "type": "Polygon",
            "coordinates": [[[x, 0.0], [x + 1.0, 0.0], [x + 1.0, 1.0], [x, 1.0], [x, 0.0]]],
        },
    })
}

/// Extract the comparison threshold from a submitted difference expression.
fn threshold_of(value: &Value) -> Option<f64> {
    find_invocation(value, "Image.gt")?
        .pointer("/arguments/image2/functionInvocationValue/arguments/value/constantValue")?
        .as_f64()
}

fn find_invocation<'a>(value: &'a Value, name: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => {
            if let Some(invocation) = map.get("functionInvocationValue") {
                if invocation.get("functionName").and_then(Value::as_str) == Some(name) {
                    return Some(invocation);
                }
            }
            map.values().find_map(|v| find_invocation(v, name))
        }
        Value::Array(items) => items.iter().find_map(|v| find_invocation(v, name)),
        _ => None,
    }
}

fn root_function(expr: &Expr) -> Option<&str> {
    expr.as_value()
        .pointer("/functionInvocationValue/functionName")?
        .as_str()
}

impl EarthEngine for MockEarthEngine {
    async fn compute(&self, expr: &Expr) -> Result<Value, RemoteError> {
        self.check_failure()?;
        let name = root_function(expr)
            .ok_or_else(|| RemoteError::Decode("expression has no root function".to_string()))?;
        match name {
            "Collection.size" => {
                let size = self.sizes.lock().unwrap().pop_front().unwrap_or(0);
                Ok(json!(size))
            }
            "Image.reduceRegion" => {
                let mean = self
                    .means
                    .lock()
                    .unwrap()
                    .pop_front()
                    .ok_or_else(|| RemoteError::Decode("mock has no mean programmed".to_string()))?;
                Ok(json!({ NDVI_BAND_NAME: mean }))
            }
            "Image.reduceToVectors" => self.vectorize(expr),
            "Geometry.area" => {
                let grids = self.grids.as_ref().ok_or_else(|| {
                    RemoteError::Decode("mock has no grids configured".to_string())
                })?;
                Ok(json!(grids.cell_area_m2))
            }
            "Collection.toList" => {
                let count = expr
                    .as_value()
                    .pointer("/functionInvocationValue/arguments/count/constantValue")
                    .and_then(Value::as_u64)
                    .unwrap_or(u64::MAX) as usize;
                let images: Vec<Value> = self.images.iter().take(count).cloned().collect();
                Ok(Value::Array(images))
            }
            other => Err(RemoteError::Decode(format!(
                "mock has no behavior for {other}"
            ))),
        }
    }

    async fn export_url(&self, _expr: &Expr, _format: ExportFormat) -> Result<String, RemoteError> {
        self.check_failure()?;
        if let Some(url) = self.export_urls.lock().unwrap().pop_front() {
            return Ok(url);
        }
        let n = self.export_counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("https://earthengine.example.test/exports/{n}"))
    }
}
