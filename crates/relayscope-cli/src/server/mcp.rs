use axum::extract::State;
use axum::response::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppState;

/// One JSON-RPC 2.0 request body. `id` is `Value` rather than a fixed type
/// since clients may send a string, a number, or omit it for a notification
/// (never the case for the three methods this server handles, but the
/// shape is preserved either way).
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// `POST /mcp`: the Model Context Protocol JSON-RPC surface over this
/// proxy's store (`initialize`, `tools/list`, `tools/call`). Every branch
/// always responds `200 OK` with a well-formed JSON-RPC envelope; MCP
/// signals failure through the envelope's `error` field or a `tools/call`
/// result's `isError`, never through the HTTP status.
pub async fn handle(State(state): State<AppState>, Json(request): Json<JsonRpcRequest>) -> Json<Value> {
    let result = match request.method.as_str() {
        "initialize" => Ok(initialize()),
        "tools/list" => Ok(tools_list()),
        "tools/call" => tools_call(&state, &request.params).await,
        other => Err(format!("unknown method: {other}")),
    };

    match result {
        Ok(result) => Json(json!({ "jsonrpc": "2.0", "id": request.id, "result": result })),
        Err(message) => Json(json!({
            "jsonrpc": "2.0",
            "id": request.id,
            "error": { "code": -32601, "message": message },
        })),
    }
}

fn initialize() -> Value {
    json!({
        "protocolVersion": "2024-11-05",
        "serverInfo": { "name": "relayscope", "version": env!("CARGO_PKG_VERSION") },
        "capabilities": { "tools": {} },
    })
}

fn tools_list() -> Value {
    json!({
        "tools": [
            {
                "name": "list_agents",
                "description": "List every known agent with completed and unanalyzed session counts.",
                "inputSchema": { "type": "object", "properties": {} },
            },
            {
                "name": "get_agent",
                "description": "Get one agent's profile, frozen percentiles, and finding summary.",
                "inputSchema": {
                    "type": "object",
                    "properties": { "system_prompt_id": { "type": "string" } },
                    "required": ["system_prompt_id"],
                },
            },
            {
                "name": "list_sessions",
                "description": "List recent reconstructed sessions, optionally scoped to one agent.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "system_prompt_id": { "type": "string" },
                        "limit": { "type": "integer" },
                    },
                },
            },
            {
                "name": "get_session",
                "description": "Get one session's counters, tool usage, and event timeline.",
                "inputSchema": {
                    "type": "object",
                    "properties": { "session_id": { "type": "string" } },
                    "required": ["session_id"],
                },
            },
            {
                "name": "list_findings",
                "description": "List security/behavioral findings, optionally filtered by status.",
                "inputSchema": {
                    "type": "object",
                    "properties": { "status": { "type": "string", "enum": ["open", "fixed", "ignored"] } },
                },
            },
        ],
    })
}

/// Dispatches one `tools/call`, wrapping the handler's result (or a
/// store-layer error) as `{content:[{type:"text", text:<json>}], isError}`.
async fn tools_call(state: &AppState, params: &Value) -> Result<Value, String> {
    let name = params.get("name").and_then(Value::as_str).ok_or("missing tool name")?;
    let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

    let (payload, is_error) = match name {
        "list_agents" => match state.client.agents().list() {
            Ok(agents) => (json!(agents), false),
            Err(err) => (json!({ "error": err.to_string() }), true),
        },
        "get_agent" => match arguments.get("system_prompt_id").and_then(Value::as_str) {
            Some(id) => match state.client.agents().get(id) {
                Ok(agent) => (json!(agent), false),
                Err(err) => (json!({ "error": err.to_string() }), true),
            },
            None => (json!({ "error": "missing system_prompt_id" }), true),
        },
        "list_sessions" => {
            let system_prompt_id = arguments.get("system_prompt_id").and_then(Value::as_str);
            let limit = arguments.get("limit").and_then(Value::as_u64).unwrap_or(20) as usize;
            match state.client.sessions().list_recent(system_prompt_id, limit) {
                Ok(sessions) => (json!(sessions), false),
                Err(err) => (json!({ "error": err.to_string() }), true),
            }
        }
        "get_session" => match arguments.get("session_id").and_then(Value::as_str) {
            Some(id) => match state.client.sessions().get(id) {
                Ok(session) => (json!(session), false),
                Err(err) => (json!({ "error": err.to_string() }), true),
            },
            None => (json!({ "error": "missing session_id" }), true),
        },
        "list_findings" => {
            let status = arguments.get("status").and_then(Value::as_str).and_then(parse_finding_status);
            match state.client.findings().list(status) {
                Ok(findings) => (json!(findings), false),
                Err(err) => (json!({ "error": err.to_string() }), true),
            }
        }
        other => (json!({ "error": format!("unknown tool: {other}") }), true),
    };

    Ok(json!({
        "content": [{ "type": "text", "text": payload.to_string() }],
        "isError": is_error,
    }))
}

fn parse_finding_status(s: &str) -> Option<relayscope_types::FindingStatus> {
    use relayscope_types::FindingStatus::*;
    match s {
        "open" => Some(Open),
        "fixed" => Some(Fixed),
        "ignored" => Some(Ignored),
        _ => None,
    }
}
