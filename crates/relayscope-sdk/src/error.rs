use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the SDK facade. Wraps the lower crates' errors rather
/// than flattening them, so a caller that cares can still match on the
/// original store/runtime error.
#[derive(Debug)]
pub enum Error {
    Store(relayscope_store::Error),
    Runtime(relayscope_runtime::Error),
    NotFound(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Store(err) => write!(f, "store error: {err}"),
            Error::Runtime(err) => write!(f, "runtime error: {err}"),
            Error::NotFound(what) => write!(f, "not found: {what}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Store(err) => Some(err),
            Error::Runtime(err) => Some(err),
            Error::NotFound(_) => None,
        }
    }
}

impl From<relayscope_store::Error> for Error {
    fn from(err: relayscope_store::Error) -> Self {
        Error::Store(err)
    }
}

impl From<relayscope_runtime::Error> for Error {
    fn from(err: relayscope_runtime::Error) -> Self {
        Error::Runtime(err)
    }
}
