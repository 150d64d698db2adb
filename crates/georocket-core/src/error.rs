//! Error types for GeoRocket

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeoRocketError {
    // Input errors
    #[error("Malformed input at byte {offset}: {message}")]
    MalformedInput { offset: u64, message: String },

    #[error("Unsupported MIME type: {mime}")]
    UnsupportedMimeType { mime: String },

    // Query errors
    #[error("No indexer can handle query term: {term}")]
    UnmatchableTerm { term: String },

    #[error("Malformed query: {message}")]
    MalformedQuery { message: String },

    // Merge errors
    #[error("Cannot merge chunk: {message}")]
    Merge { message: String },

    // Window errors
    #[error("Window range [{start}, {end}) is no longer available")]
    WindowRange { start: u64, end: u64 },

    // Pipeline errors
    #[error("Store or index backend failed: {message}")]
    Upstream { message: String },

    #[error("Operation cancelled")]
    Cancelled,

    // Configuration errors
    #[error("Invalid configuration value for {key}: {reason}")]
    ConfigInvalid { key: String, reason: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GeoRocketError>;
