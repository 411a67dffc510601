use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while parsing provider request/response bodies.
#[derive(Debug)]
pub enum Error {
    /// JSON shape did not match what the provider's wire format requires
    /// (`ProviderParseError` in the error taxonomy).
    Parse(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parse(msg) => write!(f, "provider parse error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
