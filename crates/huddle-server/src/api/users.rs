use axum::{
    extract::{Path, Query, State},
    Extension,
};
use serde::Deserialize;

use huddle_shared::types::UserId;

use super::{parse_id, AppState, Envelope, FormInput, PageQuery};
use crate::engine::{Caller, NewAccount, PasswordChange, ProfileUpdate};
use crate::error::ServerError;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    value: Option<String>,
    #[serde(flatten)]
    paging: PageQuery,
}

fn user_id(raw: &str) -> Result<UserId, ServerError> {
    parse_id(raw, "user")
}

pub async fn register(
    State(state): State<AppState>,
    form: FormInput,
) -> Result<Envelope, ServerError> {
    let input = NewAccount {
        name: form.text("name"),
        username: form.text("username"),
        email: form.text("email"),
        password: form.text("password"),
    };
    let session = state.engine.register(input).await?;
    Ok(Envelope::created("User registered successfully")
        .with("user", session.user)
        .with("token", session.token))
}

pub async fn login(
    State(state): State<AppState>,
    form: FormInput,
) -> Result<Envelope, ServerError> {
    let session = state
        .engine
        .login(form.text("userInfo"), form.text("password"))
        .await?;
    Ok(Envelope::ok("User logged in successfully")
        .with("user", session.user)
        .with("token", session.token))
}

pub async fn profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Envelope, ServerError> {
    let user = state.engine.get_profile(user_id(&id)?).await?;
    Ok(Envelope::ok("Fetch user profile").with("user", user))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    form: FormInput,
) -> Result<Envelope, ServerError> {
    let update = ProfileUpdate {
        name: form.text("name"),
        bio: form.text("bio"),
    };
    let user = state.engine.update_profile(&caller, update, form.image).await?;
    Ok(Envelope::ok("User profile details has been updated").with("user", user))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    form: FormInput,
) -> Result<Envelope, ServerError> {
    let change = PasswordChange {
        password: form.text("password"),
        new_password: form.text("newPassword"),
        confirm_password: form.text("confirmPassword"),
    };
    let user = state.engine.reset_password(&caller, change).await?;
    Ok(Envelope::ok("Account password has been changed").with("user", user))
}

pub async fn report(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Envelope, ServerError> {
    let toggled = state.engine.report_user(&caller, user_id(&id)?).await?;
    let message = if toggled.added { "Add report" } else { "Removed report" };
    Ok(Envelope::ok(message).with("user", toggled.record))
}

pub async fn search(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<SearchQuery>,
) -> Result<Envelope, ServerError> {
    let (users, total) = state
        .engine
        .search_users(&caller, query.value.as_deref(), query.paging.page())
        .await?;
    let message = format!("Search result {}", query.value.as_deref().unwrap_or(""));
    Ok(Envelope::ok(message.trim_end()).total(total).with("users", users))
}

pub async fn delete_account(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<Envelope, ServerError> {
    let user = state.engine.delete_account(&caller).await?;
    Ok(Envelope::ok("Account has been deleted").with("user", user))
}
