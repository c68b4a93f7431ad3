//! Error taxonomy shared by every stage of a run.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while configuring or executing an optimization run.
///
/// Configuration and input errors are fatal before the first frame.
/// Individual job failures are absorbed by the dispatcher and only surface
/// as [`Error::AllJobsFailed`] when no job of a frame survives.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or inconsistent configuration.
    #[error("invalid config: {0}")]
    Config(String),

    /// Missing frame file or malformed initial colony.
    #[error("invalid input: {0}")]
    Input(String),

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// One job failed; it is excluded from aggregation.
    #[error("job {job} failed: {reason}")]
    JobFailed { job: usize, reason: String },

    /// Every job dispatched for a frame failed.
    #[error("all {jobs} jobs failed for frame {frame}")]
    AllJobsFailed { frame: usize, jobs: usize },

    /// Connection or protocol failure talking to a cluster worker.
    #[error("cluster error: {0}")]
    Cluster(String),

    /// The run was cancelled externally.
    #[error("interrupted")]
    Interrupted,
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub(crate) fn input(msg: impl Into<String>) -> Self {
        Error::Input(msg.into())
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
