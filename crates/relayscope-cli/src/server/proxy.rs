use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use futures::StreamExt;
use relayscope_providers::{ProviderAdapter, ResponseFacts};
use relayscope_types::short_hash;

use super::AppState;
use crate::hook::{log_and_continue, HookOutcome};

/// Headers never forwarded upstream (hop-by-hop, or ones `reqwest` sets
/// itself from the request builder).
const STRIPPED_HEADERS: &[&str] = &["host", "content-length", "transfer-encoding", "connection"];

/// Passthrough handler for `/v1/chat/completions`, `/v1/responses`, and
/// `/v1/messages`: forwards the request to the matching upstream verbatim
/// and returns its response verbatim, doing session/event bookkeeping on
/// the side. A bookkeeping failure is logged and the proxied exchange
/// proceeds regardless; see [`crate::hook`].
pub async fn handle(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();

    let parsed_body: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(err) => {
            log_and_continue("proxy.parse_request", &HookOutcome::ParseError(err.to_string()));
            return forward_raw(&state, method, &path, headers, body).await;
        }
    };

    let Some(adapter) = state.providers.detect(&path, &parsed_body) else {
        log_and_continue(
            "proxy.detect",
            &HookOutcome::ParseError(format!("no provider adapter recognizes {path}")),
        );
        return forward_raw(&state, method, &path, headers, body).await;
    };

    let base_url = upstream_base_url(&state, adapter.name());
    let (session_id, is_new, system_prompt_id, span_seq) = match adapter.parse_request(&parsed_body) {
        Ok(inputs) => {
            let system_prompt_id = inputs.system_prompt.as_deref().map(|p| short_hash(p, 16));
            let (session_id, is_new) = resolve_session(&state, &adapter, &inputs);
            let span_seq = state.next_span_seq();

            let events = adapter.events_for_request(&session_id, is_new, span_seq, &inputs, Utc::now());
            for event in events {
                let event = event.with_agent(None, system_prompt_id.clone());
                if let Err(err) = state.client.record_event(&event, system_prompt_id.as_deref()) {
                    log_and_continue("proxy.record_request_events", &HookOutcome::StoreError(err.to_string()));
                }
            }
            (session_id, is_new, system_prompt_id, span_seq)
        }
        Err(err) => {
            log_and_continue("proxy.parse_request", &HookOutcome::ParseError(err.to_string()));
            (String::new(), true, None, 0)
        }
    };

    let started = Instant::now();
    let upstream_request = state
        .upstream
        .request(method.clone(), format!("{base_url}{path}"))
        .headers(forwardable_headers(&headers))
        .body(body);

    let upstream_response = match upstream_request.send().await {
        Ok(response) => response,
        Err(err) => {
            log_and_continue("proxy.forward", &HookOutcome::UpstreamError { status: 502 });
            return (StatusCode::BAD_GATEWAY, format!("upstream request failed: {err}")).into_response();
        }
    };

    let status = upstream_response.status();
    let response_headers = upstream_response.headers().clone();
    let is_streaming = parsed_body.get("stream").and_then(serde_json::Value::as_bool).unwrap_or(false);

    let mut builder = Response::builder().status(status);
    for (name, value) in response_headers.iter() {
        if !STRIPPED_HEADERS.contains(&name.as_str()) {
            builder = builder.header(name, value);
        }
    }

    if is_streaming && !session_id.is_empty() {
        let state = state.clone();
        let adapter = adapter.clone();
        let duration_started = started;
        let (tx, rx) = tokio::sync::mpsc::channel::<std::io::Result<Bytes>>(16);

        tokio::spawn(async move {
            let mut stream = upstream_response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let item = chunk.map_err(std::io::Error::other);
                if tx.send(item).await.is_err() {
                    return;
                }
            }
            let duration_ms = duration_started.elapsed().as_millis() as u64;
            let facts = ResponseFacts {
                model: None,
                finish_reason: None,
                system_fingerprint: None,
                refusal: None,
                input_tokens: None,
                output_tokens: None,
                total_tokens: None,
                content: None,
                tool_uses: Vec::new(),
                response_id: None,
            };
            let events = adapter.events_for_response(
                &session_id,
                span_seq,
                &facts,
                duration_ms,
                Some(status.as_u16()),
                Utc::now(),
            );
            for event in events {
                let event = event.with_agent(None, system_prompt_id.clone());
                if let Err(err) = state.client.record_event(&event, system_prompt_id.as_deref()) {
                    log_and_continue("proxy.record_response_events", &HookOutcome::StoreError(err.to_string()));
                }
            }
        });

        let body_stream = futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) });
        return builder.body(Body::from_stream(body_stream)).unwrap().into_response();
    }

    let response_bytes = match upstream_response.bytes().await {
        Ok(bytes) => bytes,
        Err(err) => {
            log_and_continue("proxy.read_response", &HookOutcome::UpstreamError { status: status.as_u16() });
            return (StatusCode::BAD_GATEWAY, format!("reading upstream response failed: {err}")).into_response();
        }
    };

    if !session_id.is_empty() {
        let duration_ms = started.elapsed().as_millis() as u64;
        match serde_json::from_slice::<serde_json::Value>(&response_bytes) {
            Ok(body) => match adapter.parse_response(&body) {
                Ok(facts) => {
                    if let Some(response_id) = facts.response_id.clone() {
                        if let Some(responses) = as_responses_adapter(&state, adapter.name()) {
                            responses.record_response(response_id, session_id.clone());
                        }
                    }
                    let events = adapter.events_for_response(
                        &session_id,
                        span_seq,
                        &facts,
                        duration_ms,
                        Some(status.as_u16()),
                        Utc::now(),
                    );
                    for event in events {
                        let event = event.with_agent(None, system_prompt_id.clone());
                        if let Err(err) = state.client.record_event(&event, system_prompt_id.as_deref()) {
                            log_and_continue(
                                "proxy.record_response_events",
                                &HookOutcome::StoreError(err.to_string()),
                            );
                        }
                    }
                }
                Err(err) => log_and_continue("proxy.parse_response", &HookOutcome::ParseError(err.to_string())),
            },
            Err(err) => log_and_continue("proxy.parse_response", &HookOutcome::ParseError(err.to_string())),
        }
    }

    builder.body(Body::from(response_bytes)).unwrap().into_response()
}

fn resolve_session(
    state: &AppState,
    adapter: &std::sync::Arc<dyn ProviderAdapter>,
    inputs: &relayscope_providers::SessionInputs,
) -> (String, bool) {
    let mut resolver = state.resolver.lock().unwrap();
    if adapter.name() == "openai_responses" {
        if let Some(previous_response_id) = &inputs.continuation_key {
            if let Some(session_id) = state.providers.responses().resolve_continuation(previous_response_id) {
                resolver.continue_session(&session_id, &inputs.messages, inputs.system_prompt.as_deref(), Utc::now());
                return (session_id, false);
            }
        }
    }
    resolver.resolve(&inputs.messages, inputs.system_prompt.as_deref(), Utc::now())
}

fn as_responses_adapter<'a>(
    state: &'a AppState,
    name: &str,
) -> Option<&'a std::sync::Arc<relayscope_providers::OpenAiResponsesAdapter>> {
    (name == "openai_responses").then(|| state.providers.responses())
}

fn upstream_base_url(state: &AppState, provider_name: &str) -> String {
    match provider_name {
        "anthropic" => state.upstream_config.anthropic_base_url.clone(),
        _ => state.upstream_config.openai_base_url.clone(),
    }
}

fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = HeaderMap::new();
    for (name, value) in headers.iter() {
        if STRIPPED_HEADERS.contains(&name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            forwarded.append(name, value);
        }
    }
    forwarded
}

/// Forwards a request this proxy could not attribute to any session or
/// provider adapter, verbatim, with no bookkeeping.
async fn forward_raw(state: &AppState, method: Method, path: &str, headers: HeaderMap, body: Bytes) -> Response {
    let base_url = state.upstream_config.openai_base_url.clone();
    match state
        .upstream
        .request(method, format!("{base_url}{path}"))
        .headers(forwardable_headers(&headers))
        .body(body)
        .send()
        .await
    {
        Ok(response) => {
            let status = response.status();
            let headers = response.headers().clone();
            let bytes = response.bytes().await.unwrap_or_default();
            let mut builder = Response::builder().status(status);
            for (name, value) in headers.iter() {
                if !STRIPPED_HEADERS.contains(&name.as_str()) {
                    builder = builder.header(name, value);
                }
            }
            builder.body(Body::from(bytes)).unwrap().into_response()
        }
        Err(err) => (StatusCode::BAD_GATEWAY, format!("upstream request failed: {err}")).into_response(),
    }
}
