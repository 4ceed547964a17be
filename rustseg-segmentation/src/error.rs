//! Segmentation error types.

use thiserror::Error;

/// Result type for segmentation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Segmentation error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Bit-field codec error (range, overlap, descriptor, unknown field).
    #[error("codec error: {0}")]
    Codec(#[from] rustseg_core::Error),

    /// Segmentation type not present in the registry.
    #[error("unknown segmentation type: {0}")]
    UnknownType(String),

    /// Parameter not registered by this segmentation.
    #[error("unknown parameter '{name}' for segmentation type {type_name}")]
    UnknownParameter {
        name: String,
        type_name: &'static str,
    },

    /// Value of the wrong kind for a parameter slot.
    #[error("parameter '{name}' expects {expected}, got {found}")]
    ParameterType {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Value rejected by the segmentation.
    #[error("invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Operation not provided by this segmentation type.
    #[error("{operation} is not supported by segmentation type {type_name}")]
    Unsupported {
        operation: &'static str,
        type_name: &'static str,
    },

    /// Hit coordinate that has no bin, e.g. NaN or infinite.
    #[error("hit coordinate {value} cannot be assigned to a bin")]
    InvalidPosition { value: f64 },

    /// Offset table index outside its bounds.
    #[error("region ({row}, {column}) outside offset table bounds {rows}x{columns}")]
    RegionOutOfRange {
        row: i64,
        column: i64,
        rows: usize,
        columns: usize,
    },

    /// Offset table slot that was never configured.
    #[error("region ({row}, {column}) has no configured offsets")]
    UnconfiguredRegion { row: usize, column: usize },

    /// Invalid configuration document.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
