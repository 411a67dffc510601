use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Config(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "config error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// Resolve the workspace data directory based on priority:
/// 1. Explicit path (with tilde expansion)
/// 2. `RELAYSCOPE_PATH` environment variable (with tilde expansion)
/// 3. System data directory
/// 4. `~/.relayscope` (fallback for systems without a standard data directory)
pub fn resolve_workspace_path(explicit_path: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = explicit_path {
        return Ok(expand_tilde(path));
    }

    if let Ok(env_path) = std::env::var("RELAYSCOPE_PATH") {
        return Ok(expand_tilde(&env_path));
    }

    if let Some(data_dir) = dirs::data_dir() {
        return Ok(data_dir.join("relayscope"));
    }

    if let Some(home) = std::env::var_os("HOME") {
        return Ok(PathBuf::from(home).join(".relayscope"));
    }

    Err(Error::Config(
        "could not determine workspace path: no HOME directory or system data directory found"
            .to_string(),
    ))
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Default location of the SQLite trace store, under the workspace path.
pub fn default_db_path(explicit_workspace: Option<&str>) -> Result<PathBuf> {
    Ok(resolve_workspace_path(explicit_workspace)?.join("trace.sqlite3"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_wins_over_everything() {
        let path = resolve_workspace_path(Some("/tmp/explicit")).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/explicit"));
    }

    #[test]
    fn expand_tilde_joins_home() {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/root".to_string());
        let expanded = expand_tilde("~/data");
        assert_eq!(expanded, PathBuf::from(home).join("data"));
    }

    #[test]
    fn expand_tilde_leaves_absolute_paths_untouched() {
        assert_eq!(expand_tilde("/var/lib/x"), PathBuf::from("/var/lib/x"));
    }

    #[test]
    fn default_db_path_ends_with_trace_sqlite3() {
        let path = default_db_path(Some("/tmp/ws")).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/ws/trace.sqlite3"));
    }
}
