use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use crate::hook::{log_and_continue, HookOutcome};

/// Replay requests to upstream providers time out after this long and
/// return `504 Gateway Timeout`, independent of the per-request timeout
/// the proxy passthrough itself uses.
const REPLAY_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Deserialize)]
pub struct ReplayRequest {
    /// Provider adapter name, e.g. "openai", "openai_responses", "anthropic".
    pub provider: String,
    /// The exact request body to resend, as the dashboard reconstructed it
    /// from a session's stored history.
    pub body: serde_json::Value,
}

/// `POST /api/replay`: proxies one reconstructed request directly to its
/// upstream, bypassing session bookkeeping entirely (a replay is a
/// diagnostic action, not live traffic), and returns a normalized view of
/// the response alongside an estimated cost.
pub async fn replay(State(state): State<AppState>, Json(request): Json<ReplayRequest>) -> Response {
    let Some(adapter) = state.providers.by_name(&request.provider) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": format!("unknown provider {}", request.provider) })))
            .into_response();
    };

    let base_url = match request.provider.as_str() {
        "anthropic" => state.upstream_config.anthropic_base_url.clone(),
        _ => state.upstream_config.openai_base_url.clone(),
    };
    let path = match adapter.name() {
        "openai_responses" => "/v1/responses",
        "anthropic" => "/v1/messages",
        _ => "/v1/chat/completions",
    };

    let client = match reqwest::Client::builder().timeout(REPLAY_TIMEOUT).build() {
        Ok(client) => client,
        Err(err) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": err.to_string() }))).into_response();
        }
    };

    let started = Instant::now();
    let upstream_response = client.post(format!("{base_url}{path}")).json(&request.body).send().await;

    let upstream_response = match upstream_response {
        Ok(response) => response,
        Err(err) if err.is_timeout() => {
            log_and_continue("replay.forward", &HookOutcome::UpstreamError { status: 504 });
            return (StatusCode::GATEWAY_TIMEOUT, Json(json!({ "error": "upstream replay timed out" }))).into_response();
        }
        Err(err) => {
            log_and_continue("replay.forward", &HookOutcome::UpstreamError { status: 502 });
            return (StatusCode::BAD_GATEWAY, Json(json!({ "error": err.to_string() }))).into_response();
        }
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    let status = upstream_response.status();
    let raw_response: serde_json::Value = match upstream_response.json().await {
        Ok(body) => body,
        Err(err) => {
            log_and_continue("replay.parse_response", &HookOutcome::ParseError(err.to_string()));
            return (StatusCode::BAD_GATEWAY, Json(json!({ "error": format!("invalid upstream body: {err}") })))
                .into_response();
        }
    };

    if !status.is_success() {
        return (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "error": "upstream returned a non-2xx status", "status": status.as_u16(), "raw_response": raw_response })),
        )
            .into_response();
    }

    let facts = match adapter.parse_response(&raw_response) {
        Ok(facts) => facts,
        Err(err) => {
            log_and_continue("replay.parse_response", &HookOutcome::ParseError(err.to_string()));
            return (StatusCode::BAD_GATEWAY, Json(json!({ "error": format!("failed to normalize response: {err}") })))
                .into_response();
        }
    };

    let pricing = state.pricing.lock().unwrap().lookup(facts.model.as_deref().unwrap_or(""));
    let input_tokens = facts.input_tokens.unwrap_or(0);
    let output_tokens = facts.output_tokens.unwrap_or(0);
    let cost_usd = pricing.estimate_usd(input_tokens, output_tokens);
    let input_cost = (input_tokens as f64 / 1_000_000.0) * pricing.input_per_million;
    let output_cost = (output_tokens as f64 / 1_000_000.0) * pricing.output_per_million;

    Json(json!({
        "raw_response": raw_response,
        "elapsed_ms": elapsed_ms,
        "cost": {
            "input": input_cost,
            "output": output_cost,
            "total": cost_usd,
        },
        "parsed": {
            "content": facts.content,
            "tool_calls": facts.tool_uses,
            "model": facts.model,
            "usage": {
                "input_tokens": facts.input_tokens,
                "output_tokens": facts.output_tokens,
                "total_tokens": facts.total_tokens,
            },
            "finish_reason": facts.finish_reason,
        },
    }))
    .into_response()
}
