//! HTTP surface.
//!
//! Routes are grouped into public (health, media, register/login),
//! session-protected (`/api/*`) and operator (`/admin/*`) routers. Every
//! success body is an [`Envelope`]; every failure is a [`ServerError`].

mod admin;
mod chats;
mod form;
mod users;

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{header, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use huddle_shared::types::Page;

use crate::auth::require_session;
use crate::config::ServerConfig;
use crate::engine::Engine;
use crate::error::ServerError;

pub use form::FormInput;

#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    let public = Router::new()
        .route("/health", get(health_check))
        .route("/media/:id", get(media_download))
        .route("/api/users/register", post(users::register))
        .route("/api/users/login", post(users::login));

    let protected = Router::new()
        .route("/api/users", get(users::search))
        .route("/api/users/profile/:id", get(users::profile))
        .route("/api/users/update-profile", put(users::update_profile))
        .route("/api/users/reset-password", patch(users::reset_password))
        .route("/api/users/report/:user_id", patch(users::report))
        .route("/api/users/delete-account", delete(users::delete_account))
        .route("/api/chats", get(chats::discover))
        .route("/api/chats/create/single", post(chats::create_single))
        .route("/api/chats/create", post(chats::create_group))
        .route("/api/chats/user-chats", get(chats::own))
        .route("/api/chats/:chat_id", get(chats::details))
        .route("/api/chats/get-members/:chat_id", get(chats::members))
        .route("/api/chats/get-admins/:chat_id", get(chats::admins))
        .route("/api/chats/update-details/:chat_id", put(chats::update_details))
        .route("/api/chats/add-remove/member/:chat_id", patch(chats::toggle_member))
        .route("/api/chats/add-remove/admin/:chat_id", patch(chats::toggle_admin))
        .route("/api/chats/add-remove/bookmark/:chat_id", patch(chats::toggle_bookmark))
        .route("/api/chats/report/:chat_id", patch(chats::report))
        .route("/api/chats/delete/:chat_id", delete(chats::delete))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    let operator = Router::new()
        .route("/admin/chats/:chat_id/status", patch(admin::set_chat_status))
        .route("/admin/users/:user_id/status", patch(admin::set_user_status))
        .route("/admin/users/:user_id/account-type", patch(admin::set_account_type));

    let limit = body_limit(state.config.max_image_size);

    Router::new()
        .merge(public)
        .merge(protected)
        .merge(operator)
        .layer(DefaultBodyLimit::max(limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Leave headroom for multipart framing around a maximum-size image.
fn body_limit(max_image_size: usize) -> usize {
    max_image_size.saturating_add(1024 * 1024)
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Success body: `{ message, status, [totalCount], <key>: payload }`.
#[derive(Debug)]
pub struct Envelope {
    status: StatusCode,
    body: Map<String, Value>,
}

impl Envelope {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        let mut body = Map::new();
        body.insert("message".into(), Value::String(message.into()));
        body.insert("status".into(), Value::from(status.as_u16()));
        Self { status, body }
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(StatusCode::OK, message)
    }

    pub fn created(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CREATED, message)
    }

    pub fn with(mut self, key: &str, payload: impl Serialize) -> Self {
        let value = serde_json::to_value(payload).unwrap_or_else(|e| {
            tracing::error!(error = %e, key, "failed to serialize response payload");
            Value::Null
        });
        self.body.insert(key.to_string(), value);
        self
    }

    pub fn total(self, count: u64) -> Self {
        self.with("totalCount", count)
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        (self.status, Json(Value::Object(self.body))).into_response()
    }
}

/// `page` and `limit` as loose strings; anything unparsable falls back to
/// the defaults.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    page: Option<String>,
    limit: Option<String>,
}

impl PageQuery {
    pub fn page(&self) -> Page {
        let parse = |v: &Option<String>| v.as_deref().and_then(|s| s.trim().parse::<u32>().ok());
        Page::new(parse(&self.page), parse(&self.limit))
    }
}

/// Parse a path segment as an id, reporting a readable error.
pub(crate) fn parse_id<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, ServerError> {
    raw.parse()
        .map_err(|_| ServerError::Validation(format!("Invalid {what} id")))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn media_download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ServerError> {
    let id: Uuid = parse_id(&id, "image")?;
    let (data, content_type) = state.engine.media().get(id).await?;
    Ok(([(header::CONTENT_TYPE, content_type)], data).into_response())
}
