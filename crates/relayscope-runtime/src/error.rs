use std::fmt;

/// Result type for relayscope-runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the background session monitor, analysis runner, and
/// pricing cache refresh.
#[derive(Debug)]
pub enum Error {
    Store(relayscope_store::Error),
    Config(String),
    Io(std::io::Error),
    Toml(toml::de::Error),
    TomlSer(toml::ser::Error),
    Serde(serde_json::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Store(err) => write!(f, "store error: {err}"),
            Error::Config(msg) => write!(f, "config error: {msg}"),
            Error::Io(err) => write!(f, "io error: {err}"),
            Error::Toml(err) => write!(f, "config parse error: {err}"),
            Error::TomlSer(err) => write!(f, "config serialize error: {err}"),
            Error::Serde(err) => write!(f, "json error: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Store(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::Toml(err) => Some(err),
            Error::TomlSer(err) => Some(err),
            Error::Serde(err) => Some(err),
            Error::Config(_) => None,
        }
    }
}

impl From<relayscope_store::Error> for Error {
    fn from(err: relayscope_store::Error) -> Self {
        Error::Store(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Toml(err)
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::TomlSer(err)
    }
}

impl From<relayscope_core::Error> for Error {
    fn from(err: relayscope_core::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err)
    }
}
