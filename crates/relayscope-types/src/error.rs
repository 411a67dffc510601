use std::fmt;

/// Result type for relayscope-types operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while constructing or validating records.
#[derive(Debug)]
pub enum Error {
    /// A field required by an invariant was missing or malformed.
    InvalidRecord(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidRecord(msg) => write!(f, "invalid record: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
