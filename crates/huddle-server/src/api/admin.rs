//! Operator endpoints, guarded by the static `ADMIN_TOKEN`.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
};
use tracing::info;

use huddle_shared::types::{AccountType, ChatId, ChatStatus, UserId, UserStatus};

use super::{parse_id, AppState, Envelope, FormInput};
use crate::auth::verify_admin_token;
use crate::error::ServerError;

fn required<T: std::str::FromStr>(form: &FormInput, name: &str) -> Result<T, ServerError> {
    form.parsed(name)?
        .ok_or_else(|| ServerError::Validation(format!("Please provide {name}")))
}

pub async fn set_chat_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    form: FormInput,
) -> Result<Envelope, ServerError> {
    verify_admin_token(&headers, &state.config)?;
    let chat_id: ChatId = parse_id(&id, "chat")?;
    let status: ChatStatus = required(&form, "status")?;

    let chat = state.engine.set_chat_status(chat_id, status).await?;
    info!(chat_id = %chat_id, status = %status, "Admin changed chat status");
    Ok(Envelope::ok("Chat status has been updated").with("chat", chat))
}

pub async fn set_user_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    form: FormInput,
) -> Result<Envelope, ServerError> {
    verify_admin_token(&headers, &state.config)?;
    let user_id: UserId = parse_id(&id, "user")?;
    let status: UserStatus = required(&form, "status")?;

    let user = state.engine.set_user_status(user_id, status).await?;
    info!(user = %user_id, status = %status, "Admin changed user status");
    Ok(Envelope::ok("User status has been updated").with("user", user))
}

pub async fn set_account_type(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    form: FormInput,
) -> Result<Envelope, ServerError> {
    verify_admin_token(&headers, &state.config)?;
    let user_id: UserId = parse_id(&id, "user")?;
    let account_type: AccountType = required(&form, "accountType")?;

    let user = state.engine.set_account_type(user_id, account_type).await?;
    Ok(Envelope::ok("Account type has been updated").with("user", user))
}
