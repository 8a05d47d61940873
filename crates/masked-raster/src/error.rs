//! Error types for raster construction, access and statistics.

use thiserror::Error;

/// Errors that can occur while building or querying a masked raster.
#[derive(Error, Debug)]
pub enum RasterError {
    /// A mandatory header key is absent.
    #[error("missing header key: {0}")]
    MissingHeaderKey(String),

    /// A header is present but describes an unusable geometry.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// A world coordinate falls outside the grid extent.
    ///
    /// Only the checked lookups return this; the plain ones use a sentinel.
    #[error("coordinate ({x}, {y}) is outside the grid extent")]
    OutOfExtent { x: f64, y: f64 },

    /// Reconciling against the mask produced no valid cells.
    #[error("mask intersection is empty: no valid cells remain after reconciliation")]
    EmptyMaskIntersection,

    /// Storage could not be sized or reserved.
    #[error("failed to allocate storage: {0}")]
    AllocationError(String),

    /// A compacted index or layer number is outside the allocated storage.
    #[error("index {index} layer {layer} is out of range ({cells} cells x {layers} layers)")]
    IndexOutOfRange {
        index: usize,
        layer: usize,
        cells: usize,
        layers: usize,
    },

    /// An appended layer cannot be mapped onto the existing footprint.
    #[error("layer geometry mismatch: {0}")]
    LayerGeometryMismatch(String),

    /// A statistics metric name is not recognized.
    #[error("unknown statistics metric: {0}")]
    UnknownMetric(String),

    /// A layer number is outside `[1, layers]`.
    #[error("layer {layer} is out of range (raster has {layers} layers)")]
    LayerOutOfRange { layer: usize, layers: usize },

    /// Caller-supplied values do not match the expected length.
    #[error("expected {expected} values, got {actual}")]
    ValueLengthMismatch { expected: usize, actual: usize },

    /// The codec collaborator failed to load or store a grid.
    #[error("codec error: {0}")]
    Codec(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RasterError {
    /// Create a MissingHeaderKey error.
    pub fn missing_key(key: impl Into<String>) -> Self {
        Self::MissingHeaderKey(key.into())
    }

    /// Create an InvalidHeader error.
    pub fn invalid_header(msg: impl Into<String>) -> Self {
        Self::InvalidHeader(msg.into())
    }

    /// Create an AllocationError.
    pub fn allocation(msg: impl Into<String>) -> Self {
        Self::AllocationError(msg.into())
    }

    /// Create a LayerGeometryMismatch error.
    pub fn layer_mismatch(msg: impl Into<String>) -> Self {
        Self::LayerGeometryMismatch(msg.into())
    }

    /// Create a Codec error.
    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }

    /// Whether the error aborts a construction or append as a whole.
    pub fn is_geometry_fatal(&self) -> bool {
        matches!(
            self,
            Self::EmptyMaskIntersection | Self::LayerGeometryMismatch(_)
        )
    }
}

impl From<std::io::Error> for RasterError {
    fn from(err: std::io::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<serde_json::Error> for RasterError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

/// Result type for raster operations.
pub type Result<T> = std::result::Result<T, RasterError>;
