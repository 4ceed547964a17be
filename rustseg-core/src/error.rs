//! Error types for rustseg-core.

use thiserror::Error;

/// Result type alias for codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for bit-field encoding and decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Field placement does not fit into 64 bits.
    #[error("field '{name}' out of range: offset {offset}, width {width} (must satisfy offset < 64, 0 < width, offset + width <= 64)")]
    FieldOutOfRange {
        name: String,
        offset: u32,
        width: u32,
    },

    /// Value cannot be represented by the field.
    #[error("value {value} out of range for field '{name}': [{min}, {max}]")]
    ValueOutOfRange {
        name: String,
        value: i64,
        min: i64,
        max: i64,
    },

    /// Two fields share at least one bit.
    #[error("field '{name}' overlaps with existing fields (mask {mask:#018x}, used {used:#018x})")]
    Overlap { name: String, mask: u64, used: u64 },

    /// Malformed descriptor entry.
    #[error("invalid descriptor entry '{entry}': {reason}")]
    InvalidDescriptor { entry: String, reason: String },

    /// No field with this name.
    #[error("unknown field name: {0}")]
    UnknownField(String),

    /// No field at this position.
    #[error("field index {index} out of bounds (coder has {len} fields)")]
    UnknownIndex { index: usize, len: usize },
}
