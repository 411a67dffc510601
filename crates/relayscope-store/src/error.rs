use std::fmt;

/// Result type for relayscope-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reading or writing the trace store.
#[derive(Debug)]
pub enum Error {
    /// The underlying SQLite call failed.
    Database(rusqlite::Error),
    /// Serializing or deserializing a JSON column failed.
    Serde(serde_json::Error),
    /// A recommendation or finding transition was attempted that the state
    /// machine does not allow.
    IllegalTransition { from: String, to: String },
    /// Caller asked for a row that does not exist.
    NotFound(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Database(err) => write!(f, "store database error: {err}"),
            Error::Serde(err) => write!(f, "store serialization error: {err}"),
            Error::IllegalTransition { from, to } => {
                write!(f, "illegal status transition: {from} -> {to}")
            }
            Error::NotFound(what) => write!(f, "not found: {what}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Database(err) => Some(err),
            Error::Serde(err) => Some(err),
            Error::IllegalTransition { .. } | Error::NotFound(_) => None,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err)
    }
}
