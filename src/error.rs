use crate::prompt::TemplateError;
use crate::stats::Statistics;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort an evaluation run before a report is produced
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("failed to render prompt for record {index}")]
    Template {
        index: usize,
        #[source]
        source: TemplateError,
    },

    #[error("dataset is empty, nothing to evaluate")]
    EmptyDataset,

    #[error("failed to load dataset {}: {message}", .path.display())]
    Dataset { path: PathBuf, message: String },

    #[error("I/O error on {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("report JSON error")]
    Json(#[from] serde_json::Error),

    #[error("malformed report entry {index}: {message}")]
    MalformedReport { index: usize, message: String },

    #[error(
        "stat_info in {} does not match its results: recorded {recorded:?}, recomputed {recomputed:?}",
        .path.display()
    )]
    StatisticsMismatch {
        path: PathBuf,
        recorded: Statistics,
        recomputed: Statistics,
    },
}

impl EvalError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type EvalResult<T> = std::result::Result<T, EvalError>;
