//! Typed errors for project loading and annotation record parsing.

use thiserror::Error;

/// Errors that can occur while reading an annotation record.
#[derive(Debug, Error)]
pub enum CasError {
    #[error("Invalid CAS JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed section in CAS JSON: {0}")]
    InvalidSection(&'static str),

    #[error("Feature structure {0} has no type")]
    UntypedFeatureStructure(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that make a whole project archive unusable.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to open archive: {0}")]
    OpenFailed(String),

    #[error("No exportedproject.json found in {0}")]
    MissingMetadata(String),

    #[error("Invalid exportedproject.json in {archive}: {source}")]
    InvalidMetadata {
        archive: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("No source documents found in project {0}")]
    NoSourceDocuments(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}
