//! Geometry pipeline configuration

use serde::{Deserialize, Serialize};
use std::{env, fmt, str::FromStr};

/// Default number of decimal places kept for geographic coordinates
pub const DEFAULT_COORD_PRECISION: u32 = 6;

/// Default plausibility threshold, in square decimal degrees
pub const DEFAULT_MAX_AREA: f64 = 100.0;

/// Default Douglas-Peucker tolerance for reprojected tile geometries
pub const DEFAULT_SIMPLIFY_TOLERANCE: f64 = 0.0001;

/// How a footprint crossing the ±180° meridian is re-expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AntimeridianStrategy {
    /// Split into a MultiPolygon clipped at ±180°
    #[default]
    Split,
    /// Shift longitudes to one sign so the footprint stays one Polygon
    Normalize,
}

impl fmt::Display for AntimeridianStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AntimeridianStrategy::Split => f.write_str("split"),
            AntimeridianStrategy::Normalize => f.write_str("normalize"),
        }
    }
}

impl FromStr for AntimeridianStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "split" => Ok(AntimeridianStrategy::Split),
            "normalize" => Ok(AntimeridianStrategy::Normalize),
            other => Err(format!(
                "unknown antimeridian strategy '{}', expected 'split' or 'normalize'",
                other
            )),
        }
    }
}

/// Settings threaded through every footprint pipeline call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryConfig {
    pub antimeridian_strategy: AntimeridianStrategy,
    pub coordinate_precision: u32,
    pub max_area: f64,
    /// Simplification applied after reprojection; 0 disables it
    pub simplify_tolerance: f64,
    /// Use the product footprint when a tile carries no data geometry
    pub allow_fallback_geometry: bool,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        GeometryConfig {
            antimeridian_strategy: AntimeridianStrategy::Split,
            coordinate_precision: DEFAULT_COORD_PRECISION,
            max_area: DEFAULT_MAX_AREA,
            simplify_tolerance: DEFAULT_SIMPLIFY_TOLERANCE,
            allow_fallback_geometry: true,
        }
    }
}

impl GeometryConfig {
    /// Build a config from `S2_*` environment variables, falling back to defaults.
    ///
    /// Unparsable values are ignored rather than treated as errors.
    pub fn from_env() -> Self {
        let defaults = GeometryConfig::default();

        GeometryConfig {
            antimeridian_strategy: env::var("S2_ANTIMERIDIAN_STRATEGY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.antimeridian_strategy),
            coordinate_precision: env::var("S2_COORD_PRECISION")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.coordinate_precision),
            max_area: env::var("S2_MAX_AREA")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_area),
            simplify_tolerance: env::var("S2_SIMPLIFY_TOLERANCE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.simplify_tolerance),
            allow_fallback_geometry: env::var("S2_ALLOW_FALLBACK_GEOMETRY")
                .ok()
                .map(|s| {
                    let s = s.trim().to_lowercase();
                    s == "true" || s == "yes" || s == "1"
                })
                .unwrap_or(defaults.allow_fallback_geometry),
        }
    }

    pub fn with_strategy(mut self, strategy: AntimeridianStrategy) -> Self {
        self.antimeridian_strategy = strategy;
        self
    }

    pub fn with_precision(mut self, precision: u32) -> Self {
        self.coordinate_precision = precision;
        self
    }
}
