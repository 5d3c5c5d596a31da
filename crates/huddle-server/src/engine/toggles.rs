//! Presence toggles on a conversation's id-sets and on user reports.
//!
//! The add-or-remove decision is read from the record loaded in the same
//! locked section; the write itself is an idempotent set primitive, so
//! concurrent toggles never duplicate an id.

use tracing::info;

use huddle_shared::types::{ChatId, ChatPrivacy, UserId, UserStatus};
use huddle_store::{Chat, ChatSet, User};

use super::{ensure_live, open_chat, require_user, Caller, Engine, Toggled};
use crate::error::{ServerError, ServerResult};

impl Engine {
    /// Add `target` to the members or remove them.
    pub async fn toggle_member(
        &self,
        caller: &Caller,
        chat_id: ChatId,
        target: Option<UserId>,
    ) -> ServerResult<Toggled<Chat>> {
        let target = require_target(target)?;
        let db = self.db()?;
        ensure_live(&db, caller)?;
        let chat = open_chat(&db, chat_id)?;

        if !chat.chat_type.is_multi_party() {
            return Err(ServerError::Validation(
                "You cannot add new members in single chat".to_string(),
            ));
        }

        let present = chat.is_member(&target);
        if self.policy.require_admin_for_role_changes {
            if target == caller.user_id {
                if !present && chat.chat_privacy != ChatPrivacy::Open {
                    return Err(ServerError::Authorization(
                        "This chat is not open to join".to_string(),
                    ));
                }
            } else if !chat.is_moderator(&caller.user_id) {
                return Err(ServerError::Authorization(
                    "Only the creator or an admin can change members".to_string(),
                ));
            }
        }

        let updated = if present {
            let sets: &[ChatSet] = if self.policy.enforce_admin_subset_of_members {
                &[ChatSet::Users, ChatSet::Admins]
            } else {
                &[ChatSet::Users]
            };
            db.pull_from_chat_sets(chat_id, sets, target)?
        } else {
            require_user(&db, target)?;
            db.add_to_chat_set(chat_id, ChatSet::Users, target)?
        };

        let record = updated.ok_or_else(gone)?;
        info!(chat_id = %chat_id, user = %target, by = %caller.user_id, added = !present, "member toggled");
        Ok(Toggled {
            added: !present,
            record,
        })
    }

    /// Grant or revoke the admin role for `target`.
    pub async fn toggle_admin(
        &self,
        caller: &Caller,
        chat_id: ChatId,
        target: Option<UserId>,
    ) -> ServerResult<Toggled<Chat>> {
        let target = require_target(target)?;
        let db = self.db()?;
        ensure_live(&db, caller)?;
        let chat = open_chat(&db, chat_id)?;

        if !chat.chat_type.is_multi_party() {
            return Err(ServerError::Validation(
                "You cannot set admin in single chat".to_string(),
            ));
        }
        if self.policy.require_admin_for_role_changes && !chat.is_moderator(&caller.user_id) {
            return Err(ServerError::Authorization(
                "Only the creator or an admin can change admins".to_string(),
            ));
        }

        let present = chat.admins.contains(&target);
        let updated = if present {
            db.pull_from_chat_sets(chat_id, &[ChatSet::Admins], target)?
        } else {
            require_user(&db, target)?;
            if self.policy.enforce_admin_subset_of_members && !chat.is_participant(&target) {
                return Err(ServerError::Conflict(
                    "User must be a member before becoming admin".to_string(),
                ));
            }
            db.add_to_chat_set(chat_id, ChatSet::Admins, target)?
        };

        let record = updated.ok_or_else(gone)?;
        info!(chat_id = %chat_id, user = %target, by = %caller.user_id, added = !present, "admin toggled");
        Ok(Toggled {
            added: !present,
            record,
        })
    }

    /// Bookmark the conversation for the caller, or remove the bookmark.
    pub async fn toggle_bookmark(
        &self,
        caller: &Caller,
        chat_id: ChatId,
    ) -> ServerResult<Toggled<Chat>> {
        let db = self.db()?;
        ensure_live(&db, caller)?;
        let chat = open_chat(&db, chat_id)?;

        let present = chat.bookmark.contains(&caller.user_id);
        let updated = if present {
            db.pull_from_chat_sets(chat_id, &[ChatSet::Bookmark], caller.user_id)?
        } else {
            db.add_to_chat_set(chat_id, ChatSet::Bookmark, caller.user_id)?
        };

        Ok(Toggled {
            added: !present,
            record: updated.ok_or_else(gone)?,
        })
    }

    /// Flag the conversation. Reports are never withdrawn.
    pub async fn add_report(&self, caller: &Caller, chat_id: ChatId) -> ServerResult<Chat> {
        let db = self.db()?;
        ensure_live(&db, caller)?;
        open_chat(&db, chat_id)?;

        let chat = db
            .add_to_chat_set(chat_id, ChatSet::Reports, caller.user_id)?
            .ok_or_else(gone)?;
        info!(chat_id = %chat_id, by = %caller.user_id, reports = chat.reports.len(), "chat reported");
        Ok(chat)
    }

    /// Flag another account, or withdraw the caller's earlier flag.
    pub async fn report_user(&self, caller: &Caller, target: UserId) -> ServerResult<Toggled<User>> {
        let db = self.db()?;
        ensure_live(&db, caller)?;

        let user = require_user(&db, target)?;
        if user.status != UserStatus::Active {
            return Err(ServerError::Conflict(
                "User profile is not active".to_string(),
            ));
        }

        let present = user.reports.contains(&caller.user_id);
        let updated = if present {
            db.remove_user_report(target, caller.user_id)?
        } else {
            db.add_user_report(target, caller.user_id)?
        };
        let record = updated.ok_or_else(|| ServerError::NotFound("No user found".to_string()))?;

        info!(user = %target, by = %caller.user_id, added = !present, "user report toggled");
        Ok(Toggled {
            added: !present,
            record,
        })
    }
}

fn require_target(target: Option<UserId>) -> ServerResult<UserId> {
    target.ok_or_else(|| ServerError::Validation("No user ID is provided".to_string()))
}

fn gone() -> ServerError {
    ServerError::NotFound("No chat data found".to_string())
}
