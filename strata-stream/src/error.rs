//! Error types for streaming sessions.

use std::path::PathBuf;
use strata_data::LoadError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("load error: {0}")]
    Load(#[from] LoadError),

    #[error("{} contains no points", .0.display())]
    Empty(PathBuf),
}
