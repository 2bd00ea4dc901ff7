mod acl;
pub mod auth;
mod config;
mod families;
mod notifications;
mod rewards;
pub mod sweeper;
mod tasks;

use crate::server::auth::AuthCtx;
use crate::storage::{StorageError, Store};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware;
use axum::response::Response as AxumResponse;
use axum::{
    Json, Router,
    http::{Method, StatusCode, header},
    routing::{get, post},
};
pub use config::{AppConfig, ConfigError};
use taskify_shared::api::{ErrorBody, VersionDto};
use taskify_shared::auth::Actor;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Span, info_span};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Store,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: AppConfig, store: Store) -> Self {
        let store = store.with_rejection_reentry(config.rejection_reentry);
        Self {
            config,
            store,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

#[derive(Clone, Debug)]
struct ReqId(pub String);

pub fn router(state: AppState) -> Router {
    let private = Router::new()
        .route(
            "/api/v1/parents/{id}",
            get(families::get_parent)
                .patch(families::update_parent)
                .delete(families::delete_parent),
        )
        .route("/api/v1/parents/{id}/status", post(families::set_status))
        .route(
            "/api/v1/parents/{id}/email-verification",
            post(families::issue_email_verification),
        )
        .route(
            "/api/v1/parents/{id}/children",
            get(families::list_children).post(families::create_child),
        )
        .route(
            "/api/v1/parents/{id}/categories",
            get(families::list_categories).post(families::create_category),
        )
        .route(
            "/api/v1/parents/{id}/tasks",
            get(tasks::list_parent_tasks).post(tasks::create_task),
        )
        .route(
            "/api/v1/parents/{id}/rewards",
            get(rewards::list_parent_rewards).post(rewards::create_reward),
        )
        .route(
            "/api/v1/children/{id}",
            get(families::get_child)
                .patch(families::update_child)
                .delete(families::delete_child),
        )
        .route("/api/v1/children/{id}/points", get(families::child_points))
        .route("/api/v1/children/{id}/tasks", get(tasks::list_child_tasks))
        .route(
            "/api/v1/children/{id}/redemptions",
            get(rewards::list_child_redemptions),
        )
        .route("/api/v1/children/{id}/rewards", get(rewards::list_child_rewards))
        .route(
            "/api/v1/categories/{id}",
            get(families::get_category)
                .patch(families::update_category)
                .delete(families::delete_category),
        )
        .route(
            "/api/v1/tasks/{id}",
            get(tasks::get_task)
                .patch(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route(
            "/api/v1/tasks/{id}/occurrences",
            get(tasks::list_occurrences).post(tasks::create_occurrence),
        )
        .route(
            "/api/v1/tasks/{id}/comments",
            get(tasks::list_comments).post(tasks::add_comment),
        )
        .route("/api/v1/tasks/{id}/{action}", post(tasks::task_action))
        .route(
            "/api/v1/comments/{id}",
            axum::routing::patch(tasks::update_comment).delete(tasks::delete_comment),
        )
        .route(
            "/api/v1/rewards/{id}",
            get(rewards::get_reward)
                .patch(rewards::update_reward)
                .delete(rewards::delete_reward),
        )
        .route(
            "/api/v1/rewards/{id}/redemptions",
            get(rewards::list_reward_redemptions).post(rewards::request_redemption),
        )
        .route(
            "/api/v1/rewards/{id}/eligibility/{child_id}",
            get(rewards::eligibility),
        )
        .route("/api/v1/redemptions/{id}", get(rewards::get_redemption))
        .route(
            "/api/v1/redemptions/{id}/{action}",
            post(rewards::redemption_action),
        )
        .route(
            "/api/v1/notifications",
            get(notifications::list).post(notifications::create),
        )
        .route("/api/v1/notifications/count", get(notifications::count))
        .route(
            "/api/v1/notifications/{id}/read",
            post(notifications::mark_read),
        )
        .route(
            "/api/v1/notifications/{id}",
            axum::routing::delete(notifications::delete),
        )
        .with_state(state.clone())
        .layer(middleware::from_fn(set_auth_span_fields))
        .layer(middleware::from_fn(acl::enforce_acl))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    // Trace with request context (method, path, request_id)
    let trace = TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
        let request_id = req
            .extensions()
            .get::<ReqId>()
            .map(|r| r.0.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        info_span!(
            "request",
            method = %req.method(),
            path = %req.uri().path(),
            request_id = %request_id,
            sub = tracing::field::Empty,
            role = tracing::field::Empty,
            family = tracing::field::Empty
        )
    });

    let app = Router::new()
        .route("/healthz", get(health))
        .route("/api/v1/version", get(version))
        .route("/api/v1/parents", post(families::signup))
        .route(
            "/api/v1/email-verification/consume",
            post(families::consume_email_verification),
        )
        .merge(private)
        .with_state(state.clone())
        .layer(trace)
        .layer(middleware::from_fn(add_security_headers))
        .layer(middleware::from_fn(add_request_id));

    // Optionally add CORS for dev if configured
    if let Some(origin) = &state.config.dev_cors_origin {
        let hv = header::HeaderValue::from_str(origin)
            .unwrap_or(header::HeaderValue::from_static("http://localhost:5173"));
        let cors = CorsLayer::new()
            .allow_origin(hv)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
        app.layer(cors)
    } else {
        app
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn version() -> Json<VersionDto> {
    Json(VersionDto {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn add_request_id(
    mut req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let hdr = HeaderName::from_static("x-request-id");
    // Use provided x-request-id if present, else generate
    let rid = req
        .headers()
        .get(&hdr)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    req.extensions_mut().insert(ReqId(rid.clone()));
    let mut resp = next.run(req).await;
    if let Ok(hv) = HeaderValue::from_str(&rid) {
        resp.headers_mut().insert(hdr, hv);
    }
    Ok(resp)
}

async fn add_security_headers(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let mut resp = next.run(req).await;

    let headers = resp.headers_mut();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );
    headers.insert(
        HeaderName::from_static("cross-origin-resource-policy"),
        HeaderValue::from_static("same-origin"),
    );
    // HSTS is only honored on HTTPS; harmless otherwise
    headers.insert(
        HeaderName::from_static("strict-transport-security"),
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    // Balances and task states change under the client; never cache
    headers.insert(
        HeaderName::from_static("cache-control"),
        HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
    );

    Ok(resp)
}

async fn set_auth_span_fields(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    if let Some(auth) = req.extensions().get::<AuthCtx>() {
        let span = Span::current();
        span.record("sub", tracing::field::display(&auth.claims.sub));
        span.record("role", tracing::field::debug(&auth.claims.role));
        span.record("family", tracing::field::display(&auth.claims.family));
    }
    Ok(next.run(req).await)
}

/// The caller must be a member of `parent_id`'s family.
pub(crate) fn ensure_member(actor: &Actor, parent_id: &str) -> Result<(), AppError> {
    if actor.family().0 == parent_id {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}

/// The caller must be `parent_id` itself.
pub(crate) fn ensure_owner(actor: &Actor, parent_id: &str) -> Result<(), AppError> {
    if actor.is_parent(parent_id) {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}

pub(crate) fn found<T>(value: Option<T>, entity: &str, id: &str) -> Result<T, AppError> {
    value.ok_or_else(|| AppError::not_found(format!("{entity} not found: {id}")))
}

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized,
    Forbidden(String),
    NotFound(String),
    Conflict(&'static str, String),
    Gone(&'static str, String),
    Unprocessable(&'static str, String),
    Unavailable(String),
    Internal(String),
}

impl AppError {
    fn bad_request<T: Into<String>>(msg: T) -> Self {
        Self::BadRequest(msg.into())
    }
    fn unauthorized() -> Self {
        Self::Unauthorized
    }
    fn forbidden() -> Self {
        Self::Forbidden("forbidden".into())
    }
    fn not_found<T: Into<String>>(msg: T) -> Self {
        Self::NotFound(msg.into())
    }
    fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        let msg = e.to_string();
        match e {
            StorageError::NotFound { .. } => AppError::NotFound(msg),
            StorageError::ConstraintViolation(_) => AppError::Conflict("constraint_violation", msg),
            StorageError::InvalidTransition { .. } => AppError::Conflict("invalid_transition", msg),
            StorageError::AlreadyUsed => AppError::Conflict("already_used", msg),
            StorageError::InsufficientBalance { .. } => {
                AppError::Unprocessable("insufficient_balance", msg)
            }
            StorageError::RewardUnavailable(_) => {
                AppError::Unprocessable("reward_unavailable", msg)
            }
            StorageError::Expired => AppError::Gone("expired", msg),
            StorageError::Invalidated => AppError::Gone("invalidated", msg),
            StorageError::Unauthorized(m) => AppError::Forbidden(m),
            StorageError::InvalidInput(m) => AppError::BadRequest(m),
            StorageError::TransactionFailed(_) => AppError::Unavailable(msg),
            StorageError::Corrupt(_)
            | StorageError::Database(_)
            | StorageError::Pool(_)
            | StorageError::Task(_)
            | StorageError::Migration(_) => AppError::Internal(msg),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, msg, kind, detail) = match self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m, "bad_request", None),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized".into(),
                "unauthorized",
                None,
            ),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, m, "forbidden", None),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m, "not_found", None),
            AppError::Conflict(kind, m) => (StatusCode::CONFLICT, m, kind, None),
            AppError::Gone(kind, m) => (StatusCode::GONE, m, kind, None),
            AppError::Unprocessable(kind, m) => (StatusCode::UNPROCESSABLE_ENTITY, m, kind, None),
            AppError::Unavailable(m) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "temporarily unavailable, retry".into(),
                "transaction_failed",
                Some(m),
            ),
            // Do not leak internal error details to clients, but log them
            AppError::Internal(m) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".into(),
                "internal",
                Some(m),
            ),
        };
        if let Some(detail) = detail {
            tracing::error!(status = %status, kind = kind, message = %msg, detail = %detail, "request failed");
        } else if status.is_client_error() {
            tracing::warn!(status = %status, kind = kind, message = %msg, "request rejected");
        }
        let body = axum::Json(ErrorBody {
            error: msg,
            kind: kind.to_string(),
        });
        (status, body).into_response()
    }
}
