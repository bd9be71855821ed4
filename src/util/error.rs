//! Error types for BVH baking.

use thiserror::Error;

/// Main error type for build, serialization and buffer I/O.
#[derive(Error, Debug)]
pub enum Error {
    /// Bake was invoked with no triangles
    #[error("Scene contains no triangles")]
    EmptyScene,

    /// Serialized output would not fit in the record budget
    #[error("Record budget exceeded: needed {needed} records, capacity is {capacity}")]
    CapacityExceeded { needed: usize, capacity: usize },

    /// The output buffer could not be reserved
    #[error("Could not reserve {units} buffer units")]
    Allocation { units: usize },

    /// A leaf payload field does not fit its packed bit range
    #[error("{field} {value} out of range (max {max})")]
    PayloadOutOfRange {
        field: &'static str,
        value: u32,
        max: u32,
    },

    /// Serialized buffer does not decode as a skip-encoded tree
    #[error("Malformed BVH buffer: {0}")]
    MalformedBuffer(String),

    /// Bake settings are out of range
    #[error("Invalid bake settings: {0}")]
    InvalidSettings(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (settings or scene) error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a malformed buffer error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedBuffer(msg.into())
    }

    /// Create an invalid settings error.
    pub fn invalid_settings(msg: impl Into<String>) -> Self {
        Self::InvalidSettings(msg.into())
    }
}

/// Result type alias for BVH operations.
pub type Result<T> = std::result::Result<T, Error>;
