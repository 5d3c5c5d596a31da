//! Records persisted in the database.
//!
//! Every struct serializes with camelCase field names so it can be returned
//! directly in API responses.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use huddle_shared::types::{
    AccountType, ChatId, ChatPrivacy, ChatStatus, ChatType, UserId, UserStatus,
};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub username: String,
    pub email: String,
    /// Argon2 PHC string. Never leaves the server.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub profile_image: Option<String>,
    pub bio: String,
    pub status: UserStatus,
    pub account_type: AccountType,
    /// Users who flagged this account.
    pub reports: BTreeSet<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The public projection of a [`User`] used in member lists and search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub id: UserId,
    pub name: String,
    pub username: String,
    pub profile_image: Option<String>,
    pub bio: String,
}

impl From<&User> for PublicProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            username: user.username.clone(),
            profile_image: user.profile_image.clone(),
            bio: user.bio.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A single, group or channel conversation with its role sets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: ChatId,
    pub name: String,
    pub bio: String,
    pub profile_image: Option<String>,
    pub chat_type: ChatType,
    pub chat_privacy: ChatPrivacy,
    pub status: ChatStatus,
    pub is_verified: bool,
    pub creator: UserId,
    pub users: BTreeSet<UserId>,
    pub admins: BTreeSet<UserId>,
    pub bookmark: BTreeSet<UserId>,
    pub reports: BTreeSet<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn is_member(&self, user: &UserId) -> bool {
        self.users.contains(user)
    }

    /// Creator or member.
    pub fn is_participant(&self, user: &UserId) -> bool {
        self.creator == *user || self.is_member(user)
    }

    /// Creator or explicit admin.
    pub fn is_moderator(&self, user: &UserId) -> bool {
        self.creator == *user || self.admins.contains(user)
    }
}
