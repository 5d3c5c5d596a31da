//! Request authentication: session tokens for users, a static bearer token
//! for operators.

use axum::{
    extract::{Query, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use subtle::ConstantTimeEq;

use huddle_shared::types::UserStatus;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::engine::Caller;
use crate::error::ServerError;

pub const ACCESS_TOKEN_HEADER: &str = "x-access-token";

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    token: Option<String>,
}

/// Validate the session token and attach the [`Caller`] to the request.
pub async fn require_session(
    State(state): State<AppState>,
    query: Option<Query<TokenQuery>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let from_query = query.and_then(|Query(q)| q.token);
    let token = session_token(req.headers())
        .or(from_query)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ServerError::Authentication("Token not found".to_string()))?;

    let claims = state.engine.sessions().validate(&token)?;
    if claims.status != UserStatus::Active {
        return Err(ServerError::Authorization(
            "User profile is not active".to_string(),
        ));
    }

    req.extensions_mut().insert(Caller::from(claims));
    Ok(next.run(req).await)
}

/// `x-access-token` wins over `Authorization: Bearer`.
fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(ACCESS_TOKEN_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(value.trim().to_string());
    }

    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_string())
}

pub fn verify_admin_token(headers: &HeaderMap, config: &ServerConfig) -> Result<(), ServerError> {
    let Some(ref expected) = config.admin_token else {
        return Err(ServerError::Authorization(
            "Admin API is disabled (no ADMIN_TOKEN configured)".into(),
        ));
    };

    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let token = auth.strip_prefix("Bearer ").unwrap_or(auth).as_bytes();

    let expected = expected.as_bytes();
    if token.len() != expected.len() || token.ct_eq(expected).unwrap_u8() != 1 {
        return Err(ServerError::Authorization("Invalid admin token".into()));
    }

    Ok(())
}
