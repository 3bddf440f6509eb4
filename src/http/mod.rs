//! HTTP surface: the ingress POST, the read routes over messages, and the
//! admin/system routes (C8). Grounded in the teacher's absence of an HTTP
//! server — this module's router shape and bearer-auth middleware are
//! adapted from `imdanibytes-nexus`'s `host_api::middleware` and
//! `clawde-io-apps`'s plain-axum `rest::mod` bootstrap.

mod admin;
mod auth;
mod ingress;
mod messages;
mod system;

use std::sync::Arc;

use axum::middleware as axum_middleware;
use axum::routing::{delete, get};
use axum::Router;

use crate::store_gateway::StoreGateway;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<StoreGateway>,
    pub auth_token: Arc<String>,
}

/// Builds the full router under the `/v1` prefix. Every route requires
/// bearer auth except `/system/ping`.
pub fn build_router(state: AppState) -> Router {
    let public = Router::new().route("/system/ping", get(system::ping));

    let protected = Router::new()
        .route(
            "/messages/{*rest}",
            get(messages::get_or_list).post(ingress::create_message),
        )
        .route("/admin/stats", get(admin::stats))
        .route("/admin/raw", get(admin::raw_all))
        .route("/admin/raw/{*rest}", get(admin::raw_matched))
        .route("/admin/logs", get(admin::recent_logs))
        .route("/admin/log/{message_id}", get(admin::logs_for_message))
        .route("/admin/reset", delete(admin::reset_all))
        .route("/admin/reset/{*rest}", delete(admin::reset_matched))
        .route("/system/health", get(system::health))
        .layer(axum_middleware::from_fn_with_state(state.clone(), auth::require_auth));

    Router::new()
        .nest("/v1", public.merge(protected))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}
