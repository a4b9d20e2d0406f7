//! Error types for cardlink-core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in cardlink-core
///
/// Every variant aborts the run. The payloads carry the display names, tokens
/// and paths an operator needs to fix the source data before re-running.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The raw export is not well-formed markup
    #[error("malformed export '{path}' at byte {position}: {message}")]
    MalformedExport {
        path: PathBuf,
        position: u64,
        message: String,
    },

    /// A card element lacks a required field
    #[error("card #{index} in '{path}' has no '{field}' field")]
    MissingField {
        path: PathBuf,
        index: usize,
        field: String,
    },

    /// A display name sanitized to nothing
    #[error("display name '{display_name}' contains no characters usable in a filename")]
    EmptyToken { display_name: String },

    /// Two distinct display names share a safe token
    #[error("cards '{first}' and '{second}' both map to image name '{token}'")]
    TokenCollision {
        first: String,
        second: String,
        token: String,
    },

    /// The raw image for a card is not in the source folder
    #[error("image '{path}' for card '{display_name}' not found")]
    MissingImage { display_name: String, path: PathBuf },

    /// Writing a destination image failed
    #[error("failed to write image '{path}': {source}")]
    ImageWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Output document could not be produced
    #[error("cannot serialize card '{card}': {message}")]
    Serialization { card: String, message: String },

    /// Directory traversal error
    #[error("failed to traverse directory: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
