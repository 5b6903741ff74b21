use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    /// Malformed or missing source file.
    #[error("Input error: {0}")]
    Input(String),

    /// No snapshot (or table) matches a selection request.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A single snapshot could not be read; other snapshots stay usable.
    #[error("Failed to read {}: {message}", path.display())]
    RecoverableIo { path: PathBuf, message: String },

    #[error("Transformation failed: {0}")]
    TransformationFailure(String),

    #[error("A refresh is already running")]
    ConcurrentRefreshRejected,

    #[error("Snapshot already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("InvalidData: {0}")]
    InvalidData(String),

    #[error("Config: {0}")]
    Config(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

impl LedgerError {
    pub(crate) fn recoverable(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        LedgerError::RecoverableIo {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Errors a long-running front end reports as a notification and keeps going.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LedgerError::Input(_)
                | LedgerError::NotFound(_)
                | LedgerError::RecoverableIo { .. }
                | LedgerError::TransformationFailure(_)
                | LedgerError::ConcurrentRefreshRejected
                | LedgerError::AlreadyExists(_)
                | LedgerError::MissingColumn(_)
                | LedgerError::InvalidData(_)
        )
    }

    /// Process exit code used by the operator CLI, distinct per kind.
    pub fn exit_code(&self) -> u8 {
        match self {
            LedgerError::Input(_) | LedgerError::MissingColumn(_) => 2,
            LedgerError::NotFound(_) => 3,
            LedgerError::RecoverableIo { .. } | LedgerError::Io(_) => 4,
            LedgerError::TransformationFailure(_) => 5,
            LedgerError::ConcurrentRefreshRejected => 6,
            LedgerError::AlreadyExists(_) => 7,
            LedgerError::Config(_) => 8,
            LedgerError::InvalidData(_) | LedgerError::Polars(_) => 9,
        }
    }
}

#[cfg(feature = "python")]
impl From<LedgerError> for pyo3::PyErr {
    fn from(err: LedgerError) -> pyo3::PyErr {
        use pyo3::exceptions::{PyLookupError, PyRuntimeError, PyValueError};
        match err {
            LedgerError::NotFound(_) => PyLookupError::new_err(err.to_string()),
            LedgerError::Input(_) | LedgerError::InvalidData(_) | LedgerError::MissingColumn(_) => {
                PyValueError::new_err(err.to_string())
            }
            _ => PyRuntimeError::new_err(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::error::PolarsError;

    #[test]
    fn exit_codes_are_pinned_per_kind() {
        let cases = [
            (LedgerError::Input("x".into()), 2),
            (LedgerError::MissingColumn("x".into()), 2),
            (LedgerError::NotFound("x".into()), 3),
            (LedgerError::recoverable("x.parquet", "x"), 4),
            (LedgerError::Io(std::io::Error::other("x")), 4),
            (LedgerError::TransformationFailure("x".into()), 5),
            (LedgerError::ConcurrentRefreshRejected, 6),
            (LedgerError::AlreadyExists("x.parquet".into()), 7),
            (LedgerError::Config("x".into()), 8),
            (LedgerError::InvalidData("x".into()), 9),
            (LedgerError::Polars(PolarsError::ComputeError("x".into())), 9),
        ];
        for (err, code) in &cases {
            assert_eq!(err.exit_code(), *code, "{err}");
            // 0 is success, 1 covers errors from outside the crate
            assert!(err.exit_code() > 1);
        }
    }

    #[test]
    fn only_setup_failures_are_fatal() {
        assert!(!LedgerError::Config("x".into()).is_recoverable());
        assert!(!LedgerError::Io(std::io::Error::other("x")).is_recoverable());
        assert!(LedgerError::ConcurrentRefreshRejected.is_recoverable());
        assert!(LedgerError::recoverable("x.parquet", "x").is_recoverable());
    }
}
