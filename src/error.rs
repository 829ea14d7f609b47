use std::io;

use thiserror::Error;

/// Errors surfaced by the packaging pipeline.
///
/// The assembler does not recover from any of these; the first error aborts
/// the run and re-running from scratch is the recovery strategy.
#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Structural violation in an input CPIO archive or RPM file.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// Tag store API misuse: a value whose wire type does not match the
    /// type declared for the tag.
    #[error("type mismatch for tag {tag}: declared {declared}, got {actual}")]
    TypeMismatch {
        tag: String,
        declared: String,
        actual: String,
    },

    #[error("compression failed: {0}")]
    CompressionFailed(String),

    /// Reported by the reader when a stored digest does not match the
    /// recomputed one.
    #[error("digest mismatch: {0}")]
    DigestMismatch(String),

    /// A value exceeds its encodable range.
    #[error("invalid field: {0}")]
    InvalidField(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn invalid_format<S: Into<String>>(msg: S) -> Self {
        Error::InvalidFormat(msg.into())
    }

    pub fn invalid_field<S: Into<String>>(msg: S) -> Self {
        Error::InvalidField(msg.into())
    }
}
