use std::fmt;

/// Result type for relayscope-engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving sessions or computing analyses.
#[derive(Debug)]
pub enum Error {
    /// The resolver was asked to process a message list it cannot make
    /// sense of (e.g. a role it doesn't recognize in a position that
    /// matters for signature computation).
    Resolve(String),
    /// A behavioral or security computation could not proceed, typically
    /// because too few sessions were available.
    Compute(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Resolve(msg) => write!(f, "session resolution failed: {}", msg),
            Error::Compute(msg) => write!(f, "analysis computation failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
