//! `GET /messages/<id>` and `GET /messages/by-status/<status>`, merged into
//! one handler alongside the ingress POST on `/messages/{*rest}` — axum's
//! router can't mix a wildcard and a named param at the same path depth, so
//! both GET shapes dispatch from the single captured tail segment instead.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::error::ApiError;
use crate::http::AppState;
use crate::model::{Message, MessageStatus};

pub enum MessagesResponse {
    One(Message),
    Many(Vec<Message>),
}

impl IntoResponse for MessagesResponse {
    fn into_response(self) -> Response {
        match self {
            MessagesResponse::One(message) => Json(message).into_response(),
            MessagesResponse::Many(messages) => Json(messages).into_response(),
        }
    }
}

pub async fn get_or_list(
    State(state): State<AppState>,
    Path(rest): Path<String>,
) -> Result<MessagesResponse, ApiError> {
    if let Some(raw_status) = rest.strip_prefix("by-status/") {
        let status = MessageStatus::parse(raw_status)
            .ok_or_else(|| ApiError::BadRequest(format!("unknown status: {raw_status}")))?;
        return state
            .gateway
            .fetch_by_status(status)
            .map(MessagesResponse::Many)
            .map_err(ApiError::from);
    }

    state
        .gateway
        .fetch_one(&rest)
        .map(MessagesResponse::One)
        .map_err(ApiError::from)
}
