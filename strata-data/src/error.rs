//! Error types for point-file parsing and loading.

use crate::types::PointId;
use thiserror::Error;

/// Fatal problems with a point file's header or layout.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("no DATA line found in header")]
    MissingData,

    #[error("header has no {0} field")]
    MissingCoordinate(&'static str),

    #[error("unsupported data mode: {0}")]
    UnsupportedMode(String),

    #[error("invalid header line {line}: {reason}")]
    InvalidHeader { line: usize, reason: String },

    #[error("unsupported field type {kind}{size} for field {field}")]
    UnsupportedFieldType { field: String, kind: char, size: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the LZF decoder.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LzfError {
    #[error("back-reference at output offset {position} reaches {distance} bytes back")]
    BackReferenceOutOfRange { position: u64, distance: usize },

    #[error("decoded output exceeds the declared {expected} bytes")]
    OutputOverflow { expected: u64 },

    #[error("compressed stream ended inside a token")]
    Truncated,
}

/// Errors surfaced from a point load.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("point id {id} out of range (count {count})")]
    IdOutOfRange { id: PointId, count: usize },

    #[error("malformed row {row}: {reason}")]
    Parse { row: usize, reason: String },

    #[error("decompression failed: {0}")]
    Decompress(#[from] LzfError),

    #[error("compressed payload decoded to {actual} bytes, layout needs {expected}")]
    ShortPayload { expected: usize, actual: usize },

    #[error("format error: {0}")]
    Format(#[from] FormatError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
