use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use crate::error::{ParseEnumError, TransitionError};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ChatId(pub Uuid);

impl ChatId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChatId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChatId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

// ---------------------------------------------------------------------------
// String-backed enums
// ---------------------------------------------------------------------------

/// Declares an enum persisted and serialized as a fixed lowercase string.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

string_enum!(
    /// Kind of conversation. Fixed when the conversation is created.
    ChatType, "chat type" {
        Single => "single",
        Group => "group",
        Channel => "channel",
    }
);

string_enum!(
    ChatPrivacy, "chat privacy" {
        Open => "open",
        Close => "close",
        OnlyAdmins => "only_admins",
    }
);

string_enum!(
    /// Lifecycle status of a conversation. `Deleted` is terminal.
    ChatStatus, "chat status" {
        Active => "active",
        Restricted => "restricted",
        Inactive => "inactive",
        Deleted => "delete",
    }
);

string_enum!(
    /// Lifecycle status of a user account. `Deleted` is terminal.
    UserStatus, "user status" {
        Active => "active",
        Inactive => "inactive",
        Suspended => "suspended",
        Deleted => "delete",
    }
);

string_enum!(
    AccountType, "account type" {
        None => "none",
        Verify => "verify",
        Business => "business",
    }
);

impl ChatType {
    /// Group and channel conversations carry mutable membership and roles.
    pub fn is_multi_party(self) -> bool {
        matches!(self, Self::Group | Self::Channel)
    }
}

impl Default for ChatPrivacy {
    fn default() -> Self {
        Self::Open
    }
}

impl Default for AccountType {
    fn default() -> Self {
        Self::None
    }
}

// ---------------------------------------------------------------------------
// Status transition tables
// ---------------------------------------------------------------------------

impl ChatStatus {
    pub fn allowed_transitions(self) -> &'static [ChatStatus] {
        use ChatStatus::*;
        match self {
            Active => &[Restricted, Inactive, Deleted],
            Restricted => &[Active, Inactive, Deleted],
            Inactive => &[Active, Deleted],
            Deleted => &[],
        }
    }

    pub fn can_transition_to(self, next: ChatStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn transition(self, next: ChatStatus) -> Result<ChatStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                entity: "chat",
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }
}

impl UserStatus {
    pub fn allowed_transitions(self) -> &'static [UserStatus] {
        use UserStatus::*;
        match self {
            Active => &[Inactive, Suspended, Deleted],
            Inactive => &[Active, Deleted],
            Suspended => &[Active, Deleted],
            Deleted => &[],
        }
    }

    pub fn can_transition_to(self, next: UserStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn transition(self, next: UserStatus) -> Result<UserStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                entity: "user",
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// A normalized page request. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    /// Missing or zero values fall back to page 1 / the default limit;
    /// `limit` is capped at [`MAX_PAGE_LIMIT`].
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        let page = page.filter(|p| *p > 0).unwrap_or(1);
        let limit = limit
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .min(MAX_PAGE_LIMIT);
        Self { page, limit }
    }

    /// Number of rows to skip: `limit * (page - 1)`.
    pub fn offset(&self) -> u64 {
        u64::from(self.limit) * u64::from(self.page - 1)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}
