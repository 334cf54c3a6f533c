//! Change detection over satellite imagery for polygonal plots of land.
//!
//! The heavy lifting (cloud masking, compositing, raster statistics,
//! vectorization) runs inside a remote geospatial compute service; this
//! crate validates requests, sequences the remote operations, and maps the
//! results onto a stable JSON contract.

pub mod auth;
pub mod config;
pub mod detect;
pub mod ee;
pub mod geometry;
pub mod imagery;
pub mod masking;
pub mod server;
