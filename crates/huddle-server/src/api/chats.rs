use axum::{
    extract::{Path, Query, State},
    Extension,
};
use serde::Deserialize;

use huddle_shared::types::{ChatId, ChatType, UserId};

use super::{parse_id, AppState, Envelope, FormInput, PageQuery};
use crate::engine::{Caller, ChatUpdate, NewGroup};
use crate::error::ServerError;

/// Body key naming the target user of a toggle or single chat.
const TARGET_FIELD: &str = "userID";

#[derive(Debug, Deserialize)]
pub struct DiscoverQuery {
    #[serde(rename = "chatType")]
    chat_type: Option<String>,
    #[serde(flatten)]
    paging: PageQuery,
}

fn chat_id(raw: &str) -> Result<ChatId, ServerError> {
    parse_id(raw, "chat")
}

fn target(form: &FormInput) -> Result<Option<UserId>, ServerError> {
    form.parsed(TARGET_FIELD)
}

pub async fn create_single(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    form: FormInput,
) -> Result<Envelope, ServerError> {
    let (chat, created) = state.engine.create_single(&caller, target(&form)?).await?;
    let message = if created {
        "A new chat has been created"
    } else {
        "Already have chat between two users"
    };
    Ok(Envelope::created(message).with("chat", chat))
}

pub async fn discover(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<DiscoverQuery>,
) -> Result<Envelope, ServerError> {
    let chat_type = match query.chat_type.as_deref().filter(|t| !t.is_empty()) {
        Some(raw) => Some(
            raw.parse::<ChatType>()
                .map_err(|e| ServerError::Validation(e.to_string()))?,
        ),
        None => None,
    };

    let (chats, total) = state
        .engine
        .list_discoverable(&caller, chat_type, query.paging.page())
        .await?;

    let label = chat_type.map(|t| t.as_str()).unwrap_or("chats");
    Ok(Envelope::ok(format!("Fetch all {label}"))
        .total(total)
        .with("chats", chats))
}

pub async fn own(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(paging): Query<PageQuery>,
) -> Result<Envelope, ServerError> {
    let chats = state.engine.list_own(&caller, paging.page()).await?;
    Ok(Envelope::ok("Fetch user chats").with("chats", chats))
}

pub async fn details(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Envelope, ServerError> {
    let details = state.engine.get_details(chat_id(&id)?).await?;
    Ok(Envelope::ok("Fetch chat details").with("chat", details))
}

pub async fn members(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(paging): Query<PageQuery>,
) -> Result<Envelope, ServerError> {
    let members = state.engine.list_members(chat_id(&id)?, paging.page()).await?;
    Ok(Envelope::ok("Fetch all members of chat").with("members", members))
}

pub async fn admins(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(paging): Query<PageQuery>,
) -> Result<Envelope, ServerError> {
    let admins = state.engine.list_admins(chat_id(&id)?, paging.page()).await?;
    Ok(Envelope::ok("Fetch all admins of chat").with("admins", admins))
}

pub async fn create_group(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    form: FormInput,
) -> Result<Envelope, ServerError> {
    let input = NewGroup {
        name: form.text("name"),
        bio: form.text("bio"),
        chat_type: form.parsed("chatType")?,
        chat_privacy: form.parsed("chatPrivacy")?,
    };
    let details = state.engine.create_group(&caller, input, form.image).await?;
    Ok(Envelope::created("A new chat has been created").with("chat", details))
}

pub async fn update_details(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    form: FormInput,
) -> Result<Envelope, ServerError> {
    let update = ChatUpdate {
        name: form.text("name"),
        bio: form.text("bio"),
        profile_image: form.text("profileImage"),
        chat_privacy: form.parsed("chatPrivacy")?,
    };
    let chat = state
        .engine
        .update_details(&caller, chat_id(&id)?, update, form.image)
        .await?;
    Ok(Envelope::ok("Chat details has been updated").with("chat", chat))
}

pub async fn toggle_member(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    form: FormInput,
) -> Result<Envelope, ServerError> {
    let toggled = state
        .engine
        .toggle_member(&caller, chat_id(&id)?, target(&form)?)
        .await?;
    let message = if toggled.added { "Add new member" } else { "Remove member" };
    Ok(Envelope::ok(message).with("chat", toggled.record))
}

pub async fn toggle_admin(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    form: FormInput,
) -> Result<Envelope, ServerError> {
    let toggled = state
        .engine
        .toggle_admin(&caller, chat_id(&id)?, target(&form)?)
        .await?;
    let message = if toggled.added { "Add new admin" } else { "Remove admin" };
    Ok(Envelope::ok(message).with("chat", toggled.record))
}

pub async fn toggle_bookmark(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Envelope, ServerError> {
    let toggled = state.engine.toggle_bookmark(&caller, chat_id(&id)?).await?;
    let message = if toggled.added {
        "Add in bookmark"
    } else {
        "Removed from bookmark"
    };
    Ok(Envelope::ok(message).with("chat", toggled.record))
}

pub async fn report(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Envelope, ServerError> {
    let chat = state.engine.add_report(&caller, chat_id(&id)?).await?;
    Ok(Envelope::ok("Your report has been added").with("chat", chat))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Envelope, ServerError> {
    let chat = state.engine.delete_chat(&caller, chat_id(&id)?).await?;
    Ok(Envelope::ok("Chat has been deleted").with("chat", chat))
}
