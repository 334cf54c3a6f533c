//! Remote geospatial compute backend.
//!
//! The [`EarthEngine`] trait is the seam between the orchestrators and the
//! remote service: [`EeEndpoint`] speaks the Earth Engine REST v1 protocol
//! over HTTP, while [`mock::MockEarthEngine`] serves tests with programmed
//! responses. Orchestrators and the router are generic over the trait, so
//! the authenticated session is injected rather than ambient.

pub mod expr;
pub mod mock;
pub mod ops;

use std::future::Future;

use serde_json::{json, Value};
use thiserror::Error;

pub use expr::Expr;

/// Error from a remote compute operation. The façade never retries; the
/// orchestrators decide how a failure is folded into a response.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Transport-level failure (connect, TLS, protocol).
    #[error("transport error: {0}")]
    Http(String),
    /// The configured per-call timeout elapsed.
    #[error("remote compute request timed out")]
    Timeout,
    /// The remote service rejected the request: quota exceeded, pixel
    /// budget exceeded, malformed geometry, empty collection.
    #[error("remote compute rejected the request (status {status}): {message}")]
    Api { status: u16, message: String },
    /// The session credentials were not accepted.
    #[error("remote authentication failed: {0}")]
    Auth(String),
    /// The response did not have the expected shape.
    #[error("unexpected remote response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout
        } else {
            RemoteError::Http(err.to_string())
        }
    }
}

/// How an exported image is rendered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExportFormat {
    /// PNG thumbnail with the given size in pixels on each side.
    Png { dimensions: u32 },
    /// Full-resolution GeoTIFF at the given ground sampling distance.
    GeoTiff { scale_m: u32 },
}

/// Interface to the remote compute service.
///
/// `compute` evaluates an expression graph to a JSON value; `export_url`
/// registers an expression for rendering and returns the URL a caller can
/// fetch pixels from. Implementations must not compute pixels locally.
pub trait EarthEngine: Send + Sync {
    fn compute(&self, expr: &Expr) -> impl Future<Output = Result<Value, RemoteError>> + Send;

    fn export_url(
        &self,
        expr: &Expr,
        format: ExportFormat,
    ) -> impl Future<Output = Result<String, RemoteError>> + Send;
}

/// Authenticated session against the Earth Engine REST v1 API.
///
/// Built once at startup by [`crate::auth::bootstrap`] and shared read-only
/// for the process lifetime; requests reuse the same bearer token.
#[derive(Debug, Clone)]
pub struct EeEndpoint {
    http: reqwest::Client,
    base_url: String,
    project: String,
    token: String,
}

impl EeEndpoint {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        project: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project: project.into(),
            token: token.into(),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Wrap a graph node into the REST API's expression envelope.
    fn envelope(expr: &Expr) -> Value {
        json!({
            "result": "0",
            "values": { "0": expr.as_value() },
        })
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, RemoteError> {
        let url = format!("{}/projects/{}/{path}", self.base_url, self.project);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<Value>().await?);
        }

        let message = match response.json::<Value>().await {
            Ok(body) => body
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
            Err(_) => "unknown error".to_string(),
        };
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(RemoteError::Auth(message));
        }
        Err(RemoteError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

impl EarthEngine for EeEndpoint {
    async fn compute(&self, expr: &Expr) -> Result<Value, RemoteError> {
        let body = json!({ "expression": Self::envelope(expr) });
        let response = self.post_json("value:compute", &body).await?;
        response
            .get("result")
            .cloned()
            .ok_or_else(|| RemoteError::Decode("compute response missing result".to_string()))
    }

    async fn export_url(&self, expr: &Expr, format: ExportFormat) -> Result<String, RemoteError> {
        let mut body = json!({ "expression": Self::envelope(expr) });
        match format {
            ExportFormat::Png { dimensions } => {
                body["fileFormat"] = json!("PNG");
                body["grid"] = json!({
                    "dimensions": { "width": dimensions, "height": dimensions },
                });
            }
            ExportFormat::GeoTiff { scale_m } => {
                body["fileFormat"] = json!("GEO_TIFF");
                body["grid"] = json!({ "scale": scale_m });
            }
        }
        let response = self.post_json("thumbnails", &body).await?;
        let name = response
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RemoteError::Decode("thumbnail response missing name".to_string()))?;
        Ok(format!("{}/{name}:getPixels", self.base_url))
    }
}
