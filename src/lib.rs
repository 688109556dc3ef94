//! Sentinel-2 metadata to STAC Item conversion
//!
//! Reads SAFE products and Sinergise tile directories, turns the scene
//! footprint into a valid, antimeridian-safe WGS84 geometry and assembles a
//! STAC 1.1.0 Item around it.

pub mod catalog;
pub mod config;
pub mod error;
pub mod geometry;
pub mod metadata;

pub use config::{AntimeridianStrategy, GeometryConfig};
pub use error::{GeometryError, MetadataError};
pub use geometry::pipeline::{FootprintOutput, FootprintPipeline, FootprintSource};
pub use geometry::{BoundingBox, Centroid, Geometry};
