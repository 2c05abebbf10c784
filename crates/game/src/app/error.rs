use std::path::PathBuf;

use roadtrip_engine::{ConfigError, ContentError, SimError};
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Sim(#[from] SimError),
    #[error("failed to read input script {path}: {source}")]
    ScriptRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse input script {path} at {at}: {source}")]
    ScriptParse {
        path: String,
        at: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("input script step {index}: {message}")]
    ScriptInvalid { index: usize, message: String },
}
