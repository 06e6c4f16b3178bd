//! Exhaustive error type for the `ragfile` crate.
//!
//! One variant per failure mode named in the format/record/scan contract.
//! Construction and (de)serialization errors are fatal to the call that
//! raised them; the top-k scanner recovers per-file errors internally and
//! only ever surfaces [`RagFileError::ScanAborted`] to its caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagFileError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("version mismatch: file version {found}, supported {supported}")]
    VersionMismatch { found: u16, supported: u16 },

    #[error("truncated input: expected at least {needed} more bytes, found {available}")]
    Truncated { needed: usize, available: usize },

    #[error("magic mismatch: expected \"RAGF\", found {found:?}")]
    MagicMismatch { found: [u8; 4] },

    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("scan aborted: {0}")]
    ScanAborted(String),
}

pub type Result<T> = std::result::Result<T, RagFileError>;
