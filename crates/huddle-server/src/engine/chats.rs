use std::collections::BTreeSet;

use bytes::Bytes;
use chrono::Utc;
use tracing::info;

use huddle_shared::constants::SINGLE_CHAT_NAME;
use huddle_shared::types::{ChatId, ChatPrivacy, ChatStatus, ChatType, Page, UserId, UserStatus};
use huddle_store::{Chat, ChatFilter, ChatSet, Database, PublicProfile};

use super::{ensure_live, non_blank, open_chat, require_user, Caller, ChatDetails, Engine};
use crate::error::{ServerError, ServerResult};

/// Input for a group or channel.
#[derive(Debug, Clone, Default)]
pub struct NewGroup {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub chat_type: Option<ChatType>,
    pub chat_privacy: Option<ChatPrivacy>,
}

/// Partial detail update; absent or blank fields keep their value.
#[derive(Debug, Clone, Default)]
pub struct ChatUpdate {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub profile_image: Option<String>,
    pub chat_privacy: Option<ChatPrivacy>,
}

impl Engine {
    /// Return the active single chat between the caller and `target`, or
    /// create one. The flag is `true` when a new chat was created.
    pub async fn create_single(
        &self,
        caller: &Caller,
        target: Option<UserId>,
    ) -> ServerResult<(Chat, bool)> {
        let target = target.ok_or_else(|| {
            ServerError::Validation("Please provide the user id to start chatting".to_string())
        })?;
        if target == caller.user_id {
            return Err(ServerError::Validation(
                "You cannot start a chat with yourself".to_string(),
            ));
        }

        let db = self.db()?;
        ensure_live(&db, caller)?;

        let other = require_user(&db, target)?;
        if other.status != UserStatus::Active {
            return Err(ServerError::Conflict(
                "User profile is not active".to_string(),
            ));
        }

        if let Some(existing) = db.find_single_chat_between(caller.user_id, target)? {
            if existing.status == ChatStatus::Active {
                return Ok((existing, false));
            }
        }

        let now = Utc::now();
        let chat = Chat {
            id: ChatId::new(),
            name: SINGLE_CHAT_NAME.to_string(),
            bio: String::new(),
            profile_image: None,
            chat_type: ChatType::Single,
            chat_privacy: ChatPrivacy::default(),
            status: ChatStatus::Active,
            is_verified: false,
            creator: caller.user_id,
            users: BTreeSet::from([caller.user_id, target]),
            admins: BTreeSet::new(),
            bookmark: BTreeSet::new(),
            reports: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        };
        db.create_chat(&chat)?;
        info!(chat_id = %chat.id, creator = %caller.user_id, peer = %target, "single chat created");

        Ok((reload(&db, chat.id)?, true))
    }

    /// Create a group or channel; the creator becomes its first admin.
    pub async fn create_group(
        &self,
        caller: &Caller,
        input: NewGroup,
        image: Option<Bytes>,
    ) -> ServerResult<ChatDetails> {
        let name = non_blank(input.name.as_deref())
            .ok_or_else(|| ServerError::Validation("Please provide the name".to_string()))?
            .to_string();
        let chat_type = input.chat_type.ok_or_else(|| {
            ServerError::Validation("Please provide what type of chat is it.".to_string())
        })?;
        if !chat_type.is_multi_party() {
            return Err(ServerError::Validation(
                "Use a single chat to talk to one user".to_string(),
            ));
        }

        ensure_live(&*self.db()?, caller)?;
        let profile_image = self.upload_image(image).await?;

        let db = self.db()?;
        let now = Utc::now();
        let chat = Chat {
            id: ChatId::new(),
            name,
            bio: non_blank(input.bio.as_deref()).unwrap_or_default().to_string(),
            profile_image,
            chat_type,
            chat_privacy: input.chat_privacy.unwrap_or_default(),
            status: ChatStatus::Active,
            is_verified: false,
            creator: caller.user_id,
            users: BTreeSet::new(),
            admins: BTreeSet::new(),
            bookmark: BTreeSet::new(),
            reports: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        };
        db.create_chat(&chat)?;
        let chat = db
            .add_to_chat_set(chat.id, ChatSet::Admins, caller.user_id)?
            .ok_or_else(|| missing(chat.id))?;

        info!(chat_id = %chat.id, chat_type = %chat.chat_type, creator = %caller.user_id, "chat created");
        with_creator(&db, chat)
    }

    /// Active conversations the caller neither created nor joined, with the
    /// total for pagination.
    pub async fn list_discoverable(
        &self,
        caller: &Caller,
        chat_type: Option<ChatType>,
        page: Page,
    ) -> ServerResult<(Vec<Chat>, u64)> {
        let db = self.db()?;
        let mut filter = ChatFilter {
            status: Some(ChatStatus::Active),
            chat_type,
            not_participant: Some(caller.user_id),
            ..ChatFilter::default()
        };
        let chats = db.list_chats(&filter, page)?;

        if !self.policy.discovery_count_excludes_own {
            filter.not_participant = None;
        }
        let total = db.count_chats(&filter)?;
        Ok((chats, total))
    }

    /// Active conversations the caller created or belongs to.
    pub async fn list_own(&self, caller: &Caller, page: Page) -> ServerResult<Vec<Chat>> {
        let filter = ChatFilter {
            status: Some(ChatStatus::Active),
            participant: Some(caller.user_id),
            ..ChatFilter::default()
        };
        Ok(self.db()?.list_chats(&filter, page)?)
    }

    pub async fn get_details(&self, chat_id: ChatId) -> ServerResult<ChatDetails> {
        let db = self.db()?;
        let chat = open_chat(&db, chat_id)?;
        with_creator(&db, chat)
    }

    pub async fn list_members(
        &self,
        chat_id: ChatId,
        page: Page,
    ) -> ServerResult<Vec<PublicProfile>> {
        self.list_set(chat_id, ChatSet::Users, page)
    }

    pub async fn list_admins(
        &self,
        chat_id: ChatId,
        page: Page,
    ) -> ServerResult<Vec<PublicProfile>> {
        self.list_set(chat_id, ChatSet::Admins, page)
    }

    fn list_set(
        &self,
        chat_id: ChatId,
        set: ChatSet,
        page: Page,
    ) -> ServerResult<Vec<PublicProfile>> {
        let db = self.db()?;
        open_chat(&db, chat_id)?;
        Ok(db.list_profiles_in_chat_set(chat_id, set, page)?)
    }

    /// Creator-only partial update of a group or channel. An uploaded image
    /// takes precedence over a `profile_image` URL.
    pub async fn update_details(
        &self,
        caller: &Caller,
        chat_id: ChatId,
        update: ChatUpdate,
        image: Option<Bytes>,
    ) -> ServerResult<Chat> {
        {
            let db = self.db()?;
            ensure_live(&db, caller)?;
            ensure_editable(&open_chat(&db, chat_id)?, caller)?;
        }

        let uploaded = self.upload_image(image).await?;

        let db = self.db()?;
        ensure_editable(&open_chat(&db, chat_id)?, caller)?;

        let profile_image = uploaded
            .as_deref()
            .or_else(|| non_blank(update.profile_image.as_deref()));
        let chat = db
            .update_chat_details(
                chat_id,
                non_blank(update.name.as_deref()),
                non_blank(update.bio.as_deref()),
                profile_image,
                update.chat_privacy,
            )?
            .ok_or_else(|| missing(chat_id))?;

        info!(chat_id = %chat_id, by = %caller.user_id, "chat details updated");
        Ok(chat)
    }

    /// Soft-delete. Groups and channels need the creator; a single chat can
    /// be deleted by either participant.
    pub async fn delete_chat(&self, caller: &Caller, chat_id: ChatId) -> ServerResult<Chat> {
        let db = self.db()?;
        ensure_live(&db, caller)?;
        let chat = open_chat(&db, chat_id)?;

        if chat.chat_type.is_multi_party() {
            if chat.creator != caller.user_id {
                return Err(ServerError::Authorization(
                    "You don't have enough permission to delete this chat".to_string(),
                ));
            }
        } else if !chat.is_participant(&caller.user_id) {
            return Err(ServerError::Authorization(
                "You are not a participant of this chat".to_string(),
            ));
        }

        let next = chat.status.transition(ChatStatus::Deleted)?;
        let chat = db
            .set_chat_status(chat_id, next)?
            .ok_or_else(|| missing(chat_id))?;

        info!(chat_id = %chat_id, by = %caller.user_id, "chat deleted");
        Ok(chat)
    }

    /// Operator status change. Bypasses the access gate so blocked
    /// conversations can be reinstated.
    pub async fn set_chat_status(&self, chat_id: ChatId, status: ChatStatus) -> ServerResult<Chat> {
        let db = self.db()?;
        let current = db.get_chat_status(chat_id)?.ok_or_else(|| missing(chat_id))?;
        let next = current.transition(status)?;

        let chat = db
            .set_chat_status(chat_id, next)?
            .ok_or_else(|| missing(chat_id))?;
        info!(chat_id = %chat_id, from = %current, to = %next, "chat status changed");
        Ok(chat)
    }
}

fn ensure_editable(chat: &Chat, caller: &Caller) -> ServerResult<()> {
    if !chat.chat_type.is_multi_party() {
        return Err(ServerError::Validation(
            "You cannot change the details of single chat".to_string(),
        ));
    }
    if chat.creator != caller.user_id {
        return Err(ServerError::Authorization(
            "You dont have the permission to change the chat details".to_string(),
        ));
    }
    Ok(())
}

fn with_creator(db: &Database, chat: Chat) -> ServerResult<ChatDetails> {
    let creator_profile = db.get_user(chat.creator)?.as_ref().map(PublicProfile::from);
    Ok(ChatDetails {
        chat,
        creator_profile,
    })
}

fn reload(db: &Database, chat_id: ChatId) -> ServerResult<Chat> {
    db.get_chat(chat_id)?.ok_or_else(|| missing(chat_id))
}

fn missing(chat_id: ChatId) -> ServerError {
    tracing::debug!(chat_id = %chat_id, "chat vanished");
    ServerError::NotFound("No chat data found".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::*;
    use crate::engine::ModerationPolicy;

    fn group(name: &str, chat_type: ChatType) -> NewGroup {
        NewGroup {
            name: Some(name.to_string()),
            chat_type: Some(chat_type),
            ..NewGroup::default()
        }
    }

    #[tokio::test]
    async fn single_chat_is_reused_until_deleted() {
        let h = harness(ModerationPolicy::default()).await;
        let a = h.user("a");
        let b = h.user("b");

        let (first, created) = h.engine.create_single(&a, Some(b.user_id)).await.unwrap();
        assert!(created);
        assert_eq!(first.name, SINGLE_CHAT_NAME);
        assert_eq!(first.users, BTreeSet::from([a.user_id, b.user_id]));

        // Either side finds the same chat.
        let (again, created) = h.engine.create_single(&b, Some(a.user_id)).await.unwrap();
        assert!(!created);
        assert_eq!(again.id, first.id);

        h.engine.delete_chat(&a, first.id).await.unwrap();
        let (fresh, created) = h.engine.create_single(&a, Some(b.user_id)).await.unwrap();
        assert!(created);
        assert_ne!(fresh.id, first.id);

        let err = h.engine.get_details(first.id).await.unwrap_err();
        assert!(matches!(err, ServerError::Conflict(ref m) if m == "Chat has been deleted"));
    }

    #[tokio::test]
    async fn single_chat_validation() {
        let h = harness(ModerationPolicy::default()).await;
        let a = h.user("a");
        let b = h.user("b");

        let err = h.engine.create_single(&a, None).await.unwrap_err();
        assert!(matches!(err, ServerError::Validation(_)));

        let err = h.engine.create_single(&a, Some(a.user_id)).await.unwrap_err();
        assert!(matches!(err, ServerError::Validation(_)));

        let err = h.engine.create_single(&a, Some(UserId::new())).await.unwrap_err();
        assert!(matches!(err, ServerError::NotFound(_)));

        h.set_user_status(b.user_id, UserStatus::Inactive);
        let err = h.engine.create_single(&a, Some(b.user_id)).await.unwrap_err();
        assert!(matches!(err, ServerError::Conflict(ref m) if m == "User profile is not active"));
    }

    #[tokio::test]
    async fn group_creator_becomes_admin() {
        let h = harness(ModerationPolicy::default()).await;
        let a = h.user("a");

        let details = h
            .engine
            .create_group(&a, group("rustaceans", ChatType::Group), None)
            .await
            .unwrap();
        assert_eq!(details.chat.creator, a.user_id);
        assert!(details.chat.admins.contains(&a.user_id));
        assert!(details.chat.users.is_empty());
        assert_eq!(details.chat.chat_privacy, ChatPrivacy::Open);
        assert_eq!(details.creator_profile.unwrap().username, "a");
    }

    #[tokio::test]
    async fn group_validation_runs_before_upload() {
        let h = harness(ModerationPolicy::default()).await;
        let a = h.user("a");

        let blank = NewGroup {
            name: Some("   ".into()),
            chat_type: Some(ChatType::Group),
            ..NewGroup::default()
        };
        let err = h.engine.create_group(&a, blank, Some(PNG.into())).await.unwrap_err();
        assert!(matches!(err, ServerError::Validation(_)));

        let err = h
            .engine
            .create_group(&a, group("x", ChatType::Single), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Validation(_)));

        let err = h
            .engine
            .create_group(&a, group("x", ChatType::Channel), Some(Bytes::from_static(b"text")))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Validation(_)));
        let (own, _) = h
            .engine
            .list_discoverable(&h.user("b"), None, Page::default())
            .await
            .unwrap();
        assert!(own.is_empty(), "failed upload must not create a chat");
    }

    #[tokio::test]
    async fn discovery_excludes_own_but_count_does_not() {
        let h = harness(ModerationPolicy::default()).await;
        let a = h.user("a");
        let b = h.user("b");

        h.engine.create_group(&a, group("mine", ChatType::Group), None).await.unwrap();
        h.engine.create_group(&b, group("theirs", ChatType::Group), None).await.unwrap();
        h.engine.create_group(&b, group("news", ChatType::Channel), None).await.unwrap();

        let (items, total) = h
            .engine
            .list_discoverable(&a, Some(ChatType::Group), Page::default())
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "theirs");
        assert_eq!(total, 2);

        let (items, total) = h.engine.list_discoverable(&a, None, Page::default()).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "news");
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn discovery_count_can_match_items() {
        let policy = ModerationPolicy {
            discovery_count_excludes_own: true,
            ..ModerationPolicy::default()
        };
        let h = harness(policy).await;
        let a = h.user("a");
        let b = h.user("b");
        h.engine.create_group(&a, group("mine", ChatType::Group), None).await.unwrap();
        h.engine.create_group(&b, group("theirs", ChatType::Group), None).await.unwrap();

        let (items, total) = h.engine.list_discoverable(&a, None, Page::default()).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn own_list_covers_created_and_joined() {
        let h = harness(ModerationPolicy::default()).await;
        let a = h.user("a");
        let b = h.user("b");

        let mine = h.engine.create_group(&a, group("mine", ChatType::Group), None).await.unwrap();
        let theirs = h
            .engine
            .create_group(&b, group("theirs", ChatType::Group), None)
            .await
            .unwrap();
        h.engine
            .create_group(&b, group("other", ChatType::Group), None)
            .await
            .unwrap();
        h.engine
            .toggle_member(&a, theirs.chat.id, Some(a.user_id))
            .await
            .unwrap();

        let own = h.engine.list_own(&a, Page::default()).await.unwrap();
        let ids: Vec<_> = own.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![theirs.chat.id, mine.chat.id]);

        h.set_chat_status(mine.chat.id, ChatStatus::Restricted);
        assert_eq!(h.engine.list_own(&a, Page::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_details_rules() {
        let h = harness(ModerationPolicy::default()).await;
        let a = h.user("a");
        let b = h.user("b");
        let details = h.engine.create_group(&a, group("g", ChatType::Group), None).await.unwrap();
        let id = details.chat.id;

        let err = h
            .engine
            .update_details(&b, id, ChatUpdate::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Authorization(_)));

        let update = ChatUpdate {
            name: Some("renamed".into()),
            bio: Some("".into()),
            profile_image: Some("http://elsewhere/x.png".into()),
            chat_privacy: Some(ChatPrivacy::OnlyAdmins),
        };
        let chat = h.engine.update_details(&a, id, update, Some(PNG.into())).await.unwrap();
        assert_eq!(chat.name, "renamed");
        assert_eq!(chat.bio, "");
        assert_eq!(chat.chat_privacy, ChatPrivacy::OnlyAdmins);
        assert!(chat.profile_image.unwrap().starts_with("http://test/media/"));

        let (single, _) = h.engine.create_single(&a, Some(b.user_id)).await.unwrap();
        let err = h
            .engine
            .update_details(&a, single.id, ChatUpdate::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Validation(_)));
    }

    #[tokio::test]
    async fn delete_permissions() {
        let h = harness(ModerationPolicy::default()).await;
        let a = h.user("a");
        let b = h.user("b");
        let c = h.user("c");

        let details = h.engine.create_group(&a, group("g", ChatType::Group), None).await.unwrap();
        let err = h.engine.delete_chat(&b, details.chat.id).await.unwrap_err();
        assert!(matches!(err, ServerError::Authorization(_)));
        let deleted = h.engine.delete_chat(&a, details.chat.id).await.unwrap();
        assert_eq!(deleted.status, ChatStatus::Deleted);

        let (single, _) = h.engine.create_single(&a, Some(b.user_id)).await.unwrap();
        let err = h.engine.delete_chat(&c, single.id).await.unwrap_err();
        assert!(matches!(err, ServerError::Authorization(_)));
        h.engine.delete_chat(&b, single.id).await.unwrap();

        let err = h.engine.delete_chat(&b, single.id).await.unwrap_err();
        assert!(matches!(err, ServerError::Conflict(_)));
    }

    #[tokio::test]
    async fn operator_status_follows_transition_table() {
        let h = harness(ModerationPolicy::default()).await;
        let a = h.user("a");
        let details = h.engine.create_group(&a, group("g", ChatType::Group), None).await.unwrap();
        let id = details.chat.id;

        let chat = h.engine.set_chat_status(id, ChatStatus::Restricted).await.unwrap();
        assert_eq!(chat.status, ChatStatus::Restricted);
        let chat = h.engine.set_chat_status(id, ChatStatus::Active).await.unwrap();
        assert_eq!(chat.status, ChatStatus::Active);

        h.engine.set_chat_status(id, ChatStatus::Deleted).await.unwrap();
        let err = h.engine.set_chat_status(id, ChatStatus::Active).await.unwrap_err();
        assert!(matches!(err, ServerError::Conflict(_)));

        let err = h
            .engine
            .set_chat_status(ChatId::new(), ChatStatus::Active)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::NotFound(_)));
    }

    #[tokio::test]
    async fn member_listing_is_gated_and_active_only() {
        let h = harness(ModerationPolicy::default()).await;
        let a = h.user("a");
        let b = h.user("b");
        let c = h.user("c");
        let id = h.engine.create_group(&a, group("g", ChatType::Group), None).await.unwrap().chat.id;

        h.engine.toggle_member(&a, id, Some(b.user_id)).await.unwrap();
        h.engine.toggle_member(&a, id, Some(c.user_id)).await.unwrap();
        h.set_user_status(c.user_id, UserStatus::Suspended);

        let members = h.engine.list_members(id, Page::default()).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, b.user_id);

        let admins = h.engine.list_admins(id, Page::default()).await.unwrap();
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].id, a.user_id);

        h.set_chat_status(id, ChatStatus::Inactive);
        let err = h.engine.list_members(id, Page::default()).await.unwrap_err();
        assert!(matches!(err, ServerError::Conflict(ref m) if m == "Chat has been inactive"));
    }
}
