use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LoadError>;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("artifact not found at {} (build it first)", .0.display())]
    MissingArtifact(PathBuf),

    #[error("artifact path contains an interior NUL byte")]
    InvalidPath,

    #[error("failed to open {}: {reason}", path.display())]
    Open { path: PathBuf, reason: String },

    #[error("artifact does not export `{0}`")]
    MissingSymbol(String),
}
