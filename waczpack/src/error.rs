//! Error types for WACZ packaging.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for packaging operations.
pub type PackResult<T> = Result<T, PackError>;

/// Errors surfaced by a packaging run.
#[derive(Debug, Error)]
pub enum PackError {
    /// Required options missing or unusable.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// No WARC input remained after filtering.
    #[error("no .warc or .warc.gz input files")]
    InputNotFound,

    /// The parser could not make progress in an input file.
    #[error("malformed WARC data in {path}")]
    MalformedWarc {
        /// The input file that could not be parsed.
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An indexing worker task aborted; wraps the first failure.
    #[error("indexing failed")]
    IndexingFailed(#[source] Box<PackError>),

    /// ZIP writer or output sink error.
    #[error("failed writing output: {0}")]
    WriteFailed(#[source] std::io::Error),

    /// The signing collaborator reported an error.
    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// The signing collaborator did not answer within its deadline.
    #[error("signer did not respond within its deadline")]
    SignerTimeout,

    /// The signing collaborator's response failed the WACZ signature-format
    /// assertion.
    #[error("signature data is invalid: {0}")]
    SignatureInvalid(String),

    /// `process()` was called more than once on the same run.
    #[error("this run has already been consumed")]
    AlreadyConsumed,

    /// The run was cancelled cooperatively.
    #[error("run cancelled")]
    Cancelled,
}

impl From<crate::zip::ZipError> for PackError {
    fn from(e: crate::zip::ZipError) -> Self {
        match e {
            crate::zip::ZipError::Io(e) => PackError::WriteFailed(e),
            other => PackError::WriteFailed(std::io::Error::other(other)),
        }
    }
}
