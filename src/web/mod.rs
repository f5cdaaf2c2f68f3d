// Web server: Axum-based REST + SSE surface for the interaction engine.
//
// All /api/* routes serve JSON (or text/event-stream for the two push
// endpoints) and require a session token naming the acting user, sent as
// the murmur_session cookie or an Authorization: Bearer header.
//
// Auth: stateless HMAC-SHA256 session tokens. No session table in the DB.

use std::sync::Arc;

use anyhow::Result;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::Router;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::bus::EventBus;
use crate::config::Config;
use crate::db::Database;
use crate::interactions::InteractionService;

pub mod auth;
pub mod handlers;
pub mod reconcile_job;

/// Shared application state threaded through all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn Database>,
    pub config: Arc<Config>,
    pub service: InteractionService,
    pub reconcile_status: Arc<RwLock<reconcile_job::ReconcileStatus>>,
}

impl AppState {
    pub fn new(config: Config, db: Arc<dyn Database>) -> Self {
        let service = InteractionService::new(db.clone(), EventBus::new());
        Self {
            db,
            config: Arc::new(config),
            service,
            reconcile_status: Arc::new(RwLock::new(reconcile_job::ReconcileStatus::default())),
        }
    }
}

/// Start the Axum web server and block until it exits.
pub async fn run_server(config: Config, db: Arc<dyn Database>, port: u16, bind: &str) -> Result<()> {
    config.require_session_secret()?;

    let state = AppState::new(config, db);
    reconcile_job::spawn_periodic(
        state.service.counters().clone(),
        state.reconcile_status.clone(),
        state.config.reconcile_interval,
    );

    let app = build_router(state);

    let addr = format!("{bind}:{port}");
    info!("murmur listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    use handlers::{comments, events, follows, notifications, posts, status};

    // Authenticated API routes (require a valid session token)
    let protected_api = Router::new()
        .route("/api/status", get(status::get_status))
        .route("/api/reconcile", post(status::trigger_reconcile))
        .route("/api/posts/{id}/like", post(posts::like).delete(posts::unlike))
        .route(
            "/api/posts/{id}/retweet",
            post(posts::retweet).delete(posts::unretweet),
        )
        .route("/api/posts/{id}/counts", get(posts::counts))
        .route("/api/posts/{id}/events", get(events::post_events))
        .route(
            "/api/comments",
            get(comments::list_comments).post(comments::create_comment),
        )
        .route("/api/comments/{id}", axum::routing::delete(comments::delete_comment))
        .route("/api/notifications", get(notifications::list_notifications))
        .route("/api/notifications/stream", get(events::notification_stream))
        .route(
            "/api/notifications/mark-all-read",
            put(notifications::mark_all_read),
        )
        .route("/api/notifications/{id}/read", put(notifications::mark_read))
        .route("/api/transactions", post(notifications::record_transaction))
        .route(
            "/api/users/{id}/follow",
            post(follows::follow).delete(follows::unfollow),
        )
        .route("/api/me/relations", get(posts::my_relations))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    // Public routes (no auth)
    let public_api = Router::new().route("/health", get(health));

    Router::new()
        .merge(protected_api)
        .merge(public_api)
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PUT,
                    axum::http::Method::DELETE,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check: always returns 200 OK.
async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        axum::Json(serde_json::json!({ "status": "ok" })),
    )
}

/// Typed JSON error response helper.
pub fn api_error(status: StatusCode, message: &str) -> Response {
    (status, axum::Json(serde_json::json!({ "error": message }))).into_response()
}

/// The user a request's session token names.
/// Inserted into request extensions by `require_auth` middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub i64);
