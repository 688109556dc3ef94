//! Error types for the footprint pipeline and the metadata readers

use thiserror::Error;

/// Fatal conditions raised while turning a raw footprint into a final geometry.
///
/// Every variant aborts the conversion of the current scene; none of them is
/// retried inside the library.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    #[error("malformed footprint: token {position} ({token:?}) is not a finite number")]
    MalformedFootprint { token: String, position: usize },

    #[error("degenerate footprint: {distinct} distinct points, at least 3 required")]
    DegenerateGeometry { distinct: usize },

    #[error("reprojection from EPSG:{source_epsg} to EPSG:{target_epsg} failed: {message}")]
    Reprojection {
        source_epsg: u32,
        target_epsg: u32,
        message: String,
    },

    #[error("validity repair produced no polygonal geometry")]
    EmptyGeometry,

    #[error("antimeridian geometry still has {interiors} interior ring(s)")]
    TopologyInvariantViolation { interiors: usize },

    #[error("area of geometry is {area}, which exceeds the {threshold} square degree sanity threshold")]
    AreaTooLarge { area: f64, threshold: f64 },
}

impl GeometryError {
    /// Short, stable name of the error kind, used in batch reports.
    pub fn kind(&self) -> &'static str {
        match self {
            GeometryError::MalformedFootprint { .. } => "MalformedFootprintError",
            GeometryError::DegenerateGeometry { .. } => "DegenerateGeometryError",
            GeometryError::Reprojection { .. } => "ReprojectionError",
            GeometryError::EmptyGeometry => "EmptyGeometryError",
            GeometryError::TopologyInvariantViolation { .. } => "TopologyInvariantViolation",
            GeometryError::AreaTooLarge { .. } => "AreaTooLargeError",
        }
    }
}

/// Errors encountered when reading Sentinel-2 metadata sidecar files
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Missing field `{0}` in metadata")]
    MissingField(&'static str),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Unsupported scene layout: {0}")]
    UnsupportedLayout(String),
    #[error("No footprint geometry available for {0}; perhaps there is no data in the scene?")]
    NoGeometry(String),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

impl From<quick_xml::events::attributes::AttrError> for MetadataError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        MetadataError::Xml(err.into())
    }
}
