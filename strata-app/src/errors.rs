//! Error types for the command line front-end.

use std::path::PathBuf;
use strata_data::LoadError;
use strata_stream::SessionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Invalid config file {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
