use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::response::Json;
use chrono::Utc;
use relayscope_types::{Finding, FindingStatus, Severity};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{AppState, ApiError};

/// `GET /api/dashboard?workflow_id=`: the landing view, optionally scoped
/// to one agent (`workflow_id` names a `system_prompt_id`, matching the
/// dashboard's own terminology for one agent's body of sessions).
pub async fn get_dashboard(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let workflow_id = params.get("workflow_id").map(String::as_str);

    let agents = state.client.agents().list().map_err(ApiError::internal)?;
    let agents: Vec<_> = agents
        .into_iter()
        .filter(|agent| workflow_id.is_none_or(|id| agent.system_prompt_id == id))
        .collect();

    let sessions = state.client.sessions().list_recent(workflow_id, 50).map_err(ApiError::internal)?;
    let latest_session = sessions.first().map(|s| s.session_id.clone());

    Ok(Json(json!({
        "agents": agents,
        "sessions": sessions,
        "latest_session": latest_session,
        "last_updated": Utc::now(),
    })))
}

/// `GET /api/agent/{id}`: one agent's profile, its most recent behavioral +
/// security findings, and tool utilization counts.
pub async fn get_agent(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let agent = state.client.agents().get(&id).map_err(|_| ApiError::not_found(format!("agent {id}")))?;

    let patterns = state.client.store().list_analysis_sessions_for_agent(&id).map_err(ApiError::internal)?;
    let behavioral = state.client.store().latest_behavioral_result(&id).map_err(ApiError::internal)?;
    let security = match patterns.first() {
        Some(latest) => state.client.store().list_security_checks_for_analysis(&latest.id).map_err(ApiError::internal)?,
        None => Vec::new(),
    };
    let findings = state.client.findings().for_agent(&id).map_err(ApiError::internal)?;

    let evaluation_status = evaluation_status_for(&agent, behavioral.is_some(), &security);

    Ok(Json(json!({
        "agent": agent,
        "patterns": patterns,
        "tool_utilization": agent.tools_ever_used,
        "risk_analysis": {
            "behavioral": behavioral,
            "security": security,
            "evaluation_status": evaluation_status,
        },
        "findings": findings,
    })))
}

fn evaluation_status_for(
    agent: &relayscope_types::Agent,
    has_behavioral: bool,
    security: &[relayscope_types::AssessmentCheck],
) -> &'static str {
    if agent.completed_session_count == 0 {
        "insufficient_data"
    } else if security.is_empty() {
        "error"
    } else if !has_behavioral && agent.completed_session_count < 2 {
        "partial"
    } else {
        "complete"
    }
}

/// `GET /api/session/{id}`: one session's counters and full event timeline.
pub async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let session = state.client.sessions().get(&id).map_err(|_| ApiError::not_found(format!("session {id}")))?;
    Ok(Json(json!(session)))
}

#[derive(Debug, Deserialize)]
pub struct ListSessionsParams {
    pub agent_id: Option<String>,
    pub system_prompt_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// `GET /api/sessions/list?agent_id=&system_prompt_id=&status=&limit=&offset=`.
/// `agent_id` and `system_prompt_id` are accepted as synonyms, since this
/// crate keys agents by `system_prompt_id` alone (see DESIGN.md).
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(params): Query<ListSessionsParams>,
) -> Result<Json<Value>, ApiError> {
    let scope = params.system_prompt_id.as_deref().or(params.agent_id.as_deref());
    let limit = params.limit.unwrap_or(50);
    let offset = params.offset.unwrap_or(0);

    let mut sessions = state.client.sessions().list_recent(scope, limit + offset).map_err(ApiError::internal)?;
    if let Some(status) = params.status.as_deref() {
        sessions.retain(|session| session_status(session) == status);
    }
    let sessions: Vec<_> = sessions.into_iter().skip(offset).take(limit).collect();

    Ok(Json(json!({ "sessions": sessions })))
}

fn session_status(session: &relayscope_types::Session) -> &'static str {
    if session.is_completed {
        "COMPLETED"
    } else if session.is_active {
        "ACTIVE"
    } else {
        "INACTIVE"
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateFindingRequest {
    pub analysis_session_id: String,
    pub session_id: String,
    pub agent_id: Option<String>,
    pub file_path: Option<String>,
    pub line_start: Option<u32>,
    pub line_end: Option<u32>,
    pub finding_type: String,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub evidence: Value,
    #[serde(default)]
    pub owasp: Vec<String>,
    #[serde(default)]
    pub cwe: Vec<String>,
    #[serde(default)]
    pub mitre: Vec<String>,
}

/// `POST /api/findings`: creates a finding, or refreshes `updated_at` if
/// one with the same `(type, file, line, snippet)` fingerprint already
/// exists, per [`Finding::fingerprint_input`].
pub async fn create_finding(
    State(state): State<AppState>,
    Json(request): Json<CreateFindingRequest>,
) -> Result<Json<Value>, ApiError> {
    let now = Utc::now();
    let fingerprint = Finding::fingerprint_input(
        &request.finding_type,
        request.file_path.as_deref(),
        request.line_start,
        &request.description,
    );
    let finding = Finding {
        finding_id: relayscope_core::new_finding_id(),
        analysis_session_id: request.analysis_session_id,
        session_id: request.session_id,
        agent_id: request.agent_id,
        file_path: request.file_path,
        line_start: request.line_start,
        line_end: request.line_end,
        finding_type: request.finding_type,
        severity: request.severity,
        title: request.title,
        description: request.description,
        evidence: request.evidence,
        owasp: request.owasp,
        cwe: request.cwe,
        mitre: request.mitre,
        status: FindingStatus::Open,
        fingerprint,
        created_at: now,
        updated_at: now,
    };
    let finding = state.client.findings().create_or_refresh(&finding).map_err(ApiError::internal)?;
    Ok(Json(json!(finding)))
}

#[derive(Debug, Deserialize)]
pub struct PatchFindingRequest {
    pub status: FindingStatus,
    pub note: Option<String>,
}

/// `PATCH /api/finding/{id}`: sets `status` and appends `note` to the
/// description.
pub async fn patch_finding(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<PatchFindingRequest>,
) -> Result<Json<Value>, ApiError> {
    let finding = state
        .client
        .findings()
        .update_status(&id, request.status, request.note.as_deref())
        .map_err(|_| ApiError::not_found(format!("finding {id}")))?;
    Ok(Json(json!(finding)))
}

#[derive(Debug, Deserialize)]
pub struct TriggerAnalysisRequest {
    pub system_prompt_id: String,
}

/// `POST /api/sessions/analysis`: triggers an analysis run for an agent if
/// it is due. Runs to completion synchronously (see
/// [`relayscope_runtime::AnalysisRunner`]); `null` means the agent had no
/// unanalyzed sessions to analyze.
pub async fn trigger_analysis(
    State(state): State<AppState>,
    Json(request): Json<TriggerAnalysisRequest>,
) -> Result<Json<Value>, ApiError> {
    let analysis = state.client.analysis().trigger(&request.system_prompt_id).map_err(ApiError::internal)?;
    Ok(Json(json!({ "analysis_session": analysis })))
}

/// `POST /api/sessions/analysis/{id}/complete`: fetches the full result of
/// a finished analysis run (behavioral result, security checks, and
/// findings) for the dashboard to render once it stops polling.
pub async fn complete_analysis(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let store = state.client.store();
    let analysis = store
        .get_analysis_session(&id)
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found(format!("analysis session {id}")))?;
    let behavioral = store.get_behavioral_result(&id).map_err(ApiError::internal)?;
    let security = store.list_security_checks_for_analysis(&id).map_err(ApiError::internal)?;
    let findings = state.client.findings().for_analysis(&id).map_err(ApiError::internal)?;

    Ok(Json(json!({
        "analysis_session": analysis,
        "behavioral": behavioral,
        "security": security,
        "findings": findings,
    })))
}

/// `GET /api/workflow/{id}/findings`: every finding attached to an agent's
/// analysis sessions (`id` names a `system_prompt_id`).
pub async fn workflow_findings(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let findings = state.client.findings().for_agent(&id).map_err(ApiError::internal)?;
    Ok(Json(json!({ "findings": findings })))
}
