//! Conversation membership and moderation engine.
//!
//! Every operation takes an explicit [`Caller`] and runs its permission and
//! state checks against records freshly read from the store. The store lock
//! is never held across an `.await`: operations that upload an image check
//! first, release the lock for the upload, then re-check before writing.

mod chats;
mod toggles;
mod users;

use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use serde::Serialize;

use huddle_shared::session::{SessionClaims, SessionIssuer};
use huddle_shared::types::{ChatId, ChatStatus, UserId, UserStatus};
use huddle_store::{Chat, Database, PublicProfile, User};

use crate::error::{ServerError, ServerResult};
use crate::media_store::MediaStore;

pub use chats::{ChatUpdate, NewGroup};
pub use users::{NewAccount, PasswordChange, ProfileUpdate};

/// The authenticated principal behind a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    /// Status asserted by the session token; the store has the final word.
    pub status: UserStatus,
}

impl From<SessionClaims> for Caller {
    fn from(claims: SessionClaims) -> Self {
        Self {
            user_id: claims.user_id,
            status: claims.status,
        }
    }
}

/// Optional moderation rules. All off reproduces the permissive behavior
/// where any authenticated user may toggle roles on any conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModerationPolicy {
    /// Admins must be members (or the creator); leaving drops the admin role.
    pub enforce_admin_subset_of_members: bool,
    /// Role changes require the creator or an admin; self-join needs an
    /// open conversation.
    pub require_admin_for_role_changes: bool,
    /// Discovery and search counts use the same caller exclusion as the
    /// returned page.
    pub discovery_count_excludes_own: bool,
}

/// Outcome of a presence toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toggled<T> {
    /// `true` if the id was inserted, `false` if it was removed.
    pub added: bool,
    pub record: T,
}

/// A conversation together with its creator's public profile.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatDetails {
    #[serde(flatten)]
    pub chat: Chat,
    pub creator_profile: Option<PublicProfile>,
}

/// A user record plus a freshly issued session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub user: User,
    pub token: String,
}

#[derive(Clone)]
pub struct Engine {
    db: Arc<Mutex<Database>>,
    media: Arc<MediaStore>,
    sessions: Arc<SessionIssuer>,
    policy: ModerationPolicy,
}

impl Engine {
    pub fn new(
        db: Database,
        media: Arc<MediaStore>,
        sessions: SessionIssuer,
        policy: ModerationPolicy,
    ) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            media,
            sessions: Arc::new(sessions),
            policy,
        }
    }

    pub fn policy(&self) -> ModerationPolicy {
        self.policy
    }

    pub fn sessions(&self) -> &SessionIssuer {
        &self.sessions
    }

    pub fn media(&self) -> &MediaStore {
        &self.media
    }

    fn db(&self) -> ServerResult<MutexGuard<'_, Database>> {
        self.db.lock().map_err(|e| {
            tracing::error!(error = %e, "database lock poisoned");
            ServerError::Upstream("Storage unavailable".to_string())
        })
    }

    async fn upload_image(&self, image: Option<Bytes>) -> ServerResult<Option<String>> {
        match image {
            Some(data) => Ok(Some(self.media.upload(&data).await?)),
            None => Ok(None),
        }
    }
}

/// Re-read the caller and require an active account.
fn ensure_live(db: &Database, caller: &Caller) -> ServerResult<User> {
    let user = db
        .get_user(caller.user_id)?
        .ok_or_else(|| ServerError::Authentication("User not found".to_string()))?;

    if user.status != UserStatus::Active {
        return Err(ServerError::Authorization(
            "User profile is not active".to_string(),
        ));
    }
    Ok(user)
}

/// Access gate for every chat-addressed operation: only active
/// conversations pass.
fn open_chat(db: &Database, chat_id: ChatId) -> ServerResult<Chat> {
    let chat = db
        .get_chat(chat_id)?
        .ok_or_else(|| ServerError::NotFound("No chat data found".to_string()))?;

    let blocked = match chat.status {
        ChatStatus::Active => return Ok(chat),
        ChatStatus::Deleted => "Chat has been deleted",
        ChatStatus::Restricted => "Chat has been restricted",
        ChatStatus::Inactive => "Chat has been inactive",
    };
    Err(ServerError::Conflict(blocked.to_string()))
}

fn require_user(db: &Database, id: UserId) -> ServerResult<User> {
    db.get_user(id)?
        .ok_or_else(|| ServerError::NotFound("No user found".to_string()))
}

/// Treat empty or whitespace-only input as absent.
fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    use huddle_store::NewUser;
    use tempfile::TempDir;

    pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    pub struct Harness {
        pub engine: Engine,
        _media_dir: TempDir,
    }

    pub async fn harness(policy: ModerationPolicy) -> Harness {
        let dir = TempDir::new().unwrap();
        let media = MediaStore::new(dir.path().to_path_buf(), 4096, "http://test")
            .await
            .unwrap();
        let engine = Engine::new(
            Database::open_in_memory().unwrap(),
            Arc::new(media),
            SessionIssuer::generate(chrono::Duration::days(1)),
            policy,
        );
        Harness {
            engine,
            _media_dir: dir,
        }
    }

    impl Harness {
        /// Insert an account directly, skipping password hashing.
        pub fn user(&self, username: &str) -> Caller {
            let db = self.engine.db().unwrap();
            let user = db
                .create_user(&NewUser {
                    name: username,
                    username,
                    email: &format!("{username}@example.org"),
                    password_hash: "unused",
                })
                .unwrap();
            Caller {
                user_id: user.id,
                status: user.status,
            }
        }

        pub fn set_user_status(&self, id: UserId, status: UserStatus) {
            self.engine.db().unwrap().set_user_status(id, status).unwrap();
        }

        pub fn set_chat_status(&self, id: ChatId, status: ChatStatus) {
            self.engine.db().unwrap().set_chat_status(id, status).unwrap();
        }
    }
}
