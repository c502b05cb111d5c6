use serde::Serialize;
use thiserror::Error;

/// Errors raised by the analyzer core.
///
/// Each variant maps to one of the five stable error codes surfaced to
/// callers; the code is what clients are expected to match on, the message
/// is for humans.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum AnalyzerError {
    #[error("invalid fixture: {0}")]
    InvalidFixture(String),

    #[error("invalid transaction: {0}")]
    InvalidTx(String),

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("merkle root mismatch: header has {header}, computed {computed}")]
    MerkleRootMismatch { header: String, computed: String },

    #[error("undo data error: {0}")]
    UndoDataError(String),
}

impl AnalyzerError {
    /// The stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            AnalyzerError::InvalidFixture(_) => "INVALID_FIXTURE",
            AnalyzerError::InvalidTx(_) => "INVALID_TX",
            AnalyzerError::InvalidBlock(_) => "INVALID_BLOCK",
            AnalyzerError::MerkleRootMismatch { .. } => "MERKLE_ROOT_MISMATCH",
            AnalyzerError::UndoDataError(_) => "UNDO_DATA_ERROR",
        }
    }
}

/// Wire shape for `{ok: false, error: {code, message}}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl From<&AnalyzerError> for ErrorBody {
    fn from(err: &AnalyzerError) -> Self {
        ErrorBody {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = core::result::Result<T, AnalyzerError>;
