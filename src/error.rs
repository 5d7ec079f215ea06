use std::path::PathBuf;
use thiserror::Error;

/// Error taxonomy for the consolidation pipeline.
///
/// Row-level problems (bad field counts, slot overflow under the default
/// policy) are counted and logged rather than surfaced here; these variants
/// cover the fatal cases only. `Configuration` aborts the whole run before
/// any work starts, everything else is scoped to one file or one period.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("could not determine a usable text encoding for {path}")]
    Encoding { path: PathBuf },

    #[error("{path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("{path} already carries a pivoted header ({columns} columns); refusing to pivot again")]
    Reentrancy { path: PathBuf, columns: usize },

    #[error("subject {subject} has more than {max_rows} rows in {path}")]
    CapacityOverflow {
        subject: String,
        max_rows: usize,
        path: PathBuf,
    },

    #[error("join failed for period {period}: {reason}")]
    Join { period: String, reason: String },

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl PipelineError {
    /// Attach the offending path to a raw I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }
}
