//! `/admin/*`: stats snapshot, raw dumps, logs, and reset. `raw`'s optional
//! `<match>` filters by status name or id substring — the spec leaves the
//! exact filter semantics to the implementation (see DESIGN.md).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::error::ApiError;
use crate::http::AppState;
use crate::model::{LogEntry, Message, StatsSnapshot};
use crate::store_gateway::ResetScope;

pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsSnapshot>, ApiError> {
    state.gateway.stats_snapshot().map(Json).map_err(ApiError::from)
}

fn filter_raw(messages: Vec<Message>, filter: &str) -> Vec<Message> {
    let filter_upper = filter.to_ascii_uppercase();
    messages
        .into_iter()
        .filter(|m| m.id.contains(filter) || m.status.as_str() == filter_upper)
        .collect()
}

pub async fn raw_all(State(state): State<AppState>) -> Result<Json<Vec<Message>>, ApiError> {
    state.gateway.fetch_all().map(Json).map_err(ApiError::from)
}

pub async fn raw_matched(
    State(state): State<AppState>,
    Path(rest): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let all = state.gateway.fetch_all().map_err(ApiError::from)?;
    Ok(Json(filter_raw(all, &rest)))
}

pub async fn recent_logs(State(state): State<AppState>) -> Result<Json<Vec<LogEntry>>, ApiError> {
    state.gateway.recent_logs(100).map(Json).map_err(ApiError::from)
}

pub async fn logs_for_message(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
) -> Result<Json<Vec<LogEntry>>, ApiError> {
    state
        .gateway
        .logs_for_message(&message_id)
        .map(Json)
        .map_err(ApiError::from)
}

fn do_reset(state: &AppState, raw: Option<&str>) -> Result<StatusCode, ApiError> {
    let scope = ResetScope::parse(raw)
        .ok_or_else(|| ApiError::BadRequest(format!("cannot reset {raw:?}")))?;
    state.gateway.reset(scope).map_err(ApiError::from)?;
    Ok(StatusCode::OK)
}

pub async fn reset_all(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    do_reset(&state, None)
}

pub async fn reset_matched(
    State(state): State<AppState>,
    Path(rest): Path<String>,
) -> Result<StatusCode, ApiError> {
    do_reset(&state, Some(&rest))
}
