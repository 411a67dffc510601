use std::fmt;

/// Result of one interceptor hook (request bookkeeping, response
/// bookkeeping), tagged explicitly instead of propagated as an error, per
/// the "log and continue" policy: observation must never break production
/// traffic, so a hook's outcome is recorded and then ignored by the caller,
/// which always forwards the proxied request/response regardless.
#[derive(Debug)]
pub enum HookOutcome {
    Ok,
    ParseError(String),
    UpstreamError { status: u16 },
    StoreError(String),
}

impl fmt::Display for HookOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookOutcome::Ok => write!(f, "ok"),
            HookOutcome::ParseError(msg) => write!(f, "parse error: {msg}"),
            HookOutcome::UpstreamError { status } => write!(f, "upstream error: status {status}"),
            HookOutcome::StoreError(msg) => write!(f, "store error: {msg}"),
        }
    }
}

/// Logs a non-`Ok` hook outcome under the given hook name and proceeds.
/// Called at every interceptor boundary; never aborts the request.
pub fn log_and_continue(hook_name: &str, outcome: &HookOutcome) {
    match outcome {
        HookOutcome::Ok => {}
        HookOutcome::UpstreamError { status } => {
            tracing::warn!(hook = hook_name, status, "upstream returned a non-2xx status");
        }
        HookOutcome::ParseError(msg) => {
            tracing::warn!(hook = hook_name, error = %msg, "failed to parse request/response body");
        }
        HookOutcome::StoreError(msg) => {
            tracing::warn!(hook = hook_name, error = %msg, "failed to persist bookkeeping");
        }
    }
}
