//! CRUD operations for [`Chat`] records and their id-sets.

use std::collections::BTreeSet;

use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use huddle_shared::types::{ChatId, ChatPrivacy, ChatStatus, ChatType, Page, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Chat;
use crate::sql::{get_enum, get_ts, get_uuid, ts};

const CHAT_COLUMNS: &str = "id, name, bio, profile_image, chat_type, chat_privacy, status, \
                            is_verified, creator, created_at, updated_at";

/// One of the id-sets a chat owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatSet {
    Users,
    Admins,
    Bookmark,
    Reports,
}

impl ChatSet {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatSet::Users => "users",
            ChatSet::Admins => "admins",
            ChatSet::Bookmark => "bookmark",
            ChatSet::Reports => "reports",
        }
    }

    /// The in-memory copy of this set on a loaded chat.
    pub fn members(self, chat: &Chat) -> &BTreeSet<UserId> {
        match self {
            ChatSet::Users => &chat.users,
            ChatSet::Admins => &chat.admins,
            ChatSet::Bookmark => &chat.bookmark,
            ChatSet::Reports => &chat.reports,
        }
    }

    fn members_mut(self, chat: &mut Chat) -> &mut BTreeSet<UserId> {
        match self {
            ChatSet::Users => &mut chat.users,
            ChatSet::Admins => &mut chat.admins,
            ChatSet::Bookmark => &mut chat.bookmark,
            ChatSet::Reports => &mut chat.reports,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "users" => Some(ChatSet::Users),
            "admins" => Some(ChatSet::Admins),
            "bookmark" => Some(ChatSet::Bookmark),
            "reports" => Some(ChatSet::Reports),
            _ => None,
        }
    }
}

/// Filter for chat listings. Unset fields do not constrain the result.
#[derive(Debug, Clone, Default)]
pub struct ChatFilter {
    pub status: Option<ChatStatus>,
    pub chat_type: Option<ChatType>,
    /// Keep only chats this user created or is a member of.
    pub participant: Option<UserId>,
    /// Drop chats this user created or is a member of.
    pub not_participant: Option<UserId>,
}

impl ChatFilter {
    fn to_sql(&self) -> (String, Vec<String>) {
        let mut clauses = vec!["1 = 1".to_string()];
        let mut args: Vec<String> = Vec::new();

        if let Some(status) = self.status {
            args.push(status.as_str().to_string());
            clauses.push(format!("status = ?{}", args.len()));
        }
        if let Some(chat_type) = self.chat_type {
            args.push(chat_type.as_str().to_string());
            clauses.push(format!("chat_type = ?{}", args.len()));
        }
        if let Some(user) = self.participant {
            args.push(user.to_string());
            let n = args.len();
            clauses.push(format!("(creator = ?{n} OR {})", member_exists(n)));
        }
        if let Some(user) = self.not_participant {
            args.push(user.to_string());
            let n = args.len();
            clauses.push(format!("(creator != ?{n} AND NOT {})", member_exists(n)));
        }

        (clauses.join(" AND "), args)
    }
}

fn member_exists(param: usize) -> String {
    format!(
        "EXISTS (SELECT 1 FROM chat_sets s
                 WHERE s.chat_id = chats.id AND s.set_name = 'users' AND s.user_id = ?{param})"
    )
}

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a chat together with all of its id-sets.
    pub fn create_chat(&self, chat: &Chat) -> Result<()> {
        let tx = self.conn().unchecked_transaction()?;

        tx.execute(
            "INSERT INTO chats (id, name, bio, profile_image, chat_type, chat_privacy, status,
                                is_verified, creator, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                chat.id.to_string(),
                chat.name,
                chat.bio,
                chat.profile_image,
                chat.chat_type.as_str(),
                chat.chat_privacy.as_str(),
                chat.status.as_str(),
                chat.is_verified,
                chat.creator.to_string(),
                ts(&chat.created_at),
                ts(&chat.updated_at),
            ],
        )
        .map_err(StoreError::from_write)?;

        let added_at = ts(&chat.created_at);
        for set in [ChatSet::Users, ChatSet::Admins, ChatSet::Bookmark, ChatSet::Reports] {
            for user in set.members(chat) {
                insert_member(&tx, chat.id, set, *user, &added_at)?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_chat(&self, id: ChatId) -> Result<Option<Chat>> {
        load_chat(self.conn(), id)
    }

    /// Status alone, for the access gate.
    pub fn get_chat_status(&self, id: ChatId) -> Result<Option<ChatStatus>> {
        self.conn()
            .query_row(
                "SELECT status FROM chats WHERE id = ?1",
                params![id.to_string()],
                |row| get_enum(row, 0),
            )
            .optional()
            .map_err(StoreError::Sqlite)
    }

    /// The single chat whose member set is exactly `{a, b}`. An active one is
    /// preferred over a deleted or restricted one.
    pub fn find_single_chat_between(&self, a: UserId, b: UserId) -> Result<Option<Chat>> {
        let sql = format!(
            "SELECT {CHAT_COLUMNS} FROM chats
             WHERE chat_type = 'single'
               AND {}
               AND {}
               AND (SELECT COUNT(*) FROM chat_sets s
                    WHERE s.chat_id = chats.id AND s.set_name = 'users') = 2
             ORDER BY (status = 'active') DESC, created_at DESC, rowid DESC
             LIMIT 1",
            member_exists(1),
            member_exists(2),
        );
        let row = self
            .conn()
            .query_row(&sql, params![a.to_string(), b.to_string()], row_to_chat)
            .optional()?;

        match row {
            Some(mut chat) => {
                load_sets(self.conn(), &mut chat)?;
                Ok(Some(chat))
            }
            None => Ok(None),
        }
    }

    /// Newest first, `page.limit` rows after skipping `page.offset()`.
    pub fn list_chats(&self, filter: &ChatFilter, page: Page) -> Result<Vec<Chat>> {
        let (clause, args) = filter.to_sql();
        let sql = format!(
            "SELECT {CHAT_COLUMNS} FROM chats WHERE {clause}
             ORDER BY created_at DESC, rowid DESC
             LIMIT {} OFFSET {}",
            page.limit,
            page.offset()
        );

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), row_to_chat)?;

        let mut chats = Vec::new();
        for row in rows {
            let mut chat = row?;
            load_sets(self.conn(), &mut chat)?;
            chats.push(chat);
        }
        Ok(chats)
    }

    pub fn count_chats(&self, filter: &ChatFilter) -> Result<u64> {
        let (clause, args) = filter.to_sql();
        let sql = format!("SELECT COUNT(*) FROM chats WHERE {clause}");
        let count: i64 = self
            .conn()
            .query_row(&sql, params_from_iter(args.iter()), |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Replace only the supplied fields. Returns `None` if the chat is gone.
    pub fn update_chat_details(
        &self,
        id: ChatId,
        name: Option<&str>,
        bio: Option<&str>,
        profile_image: Option<&str>,
        privacy: Option<ChatPrivacy>,
    ) -> Result<Option<Chat>> {
        let tx = self.conn().unchecked_transaction()?;
        let affected = tx.execute(
            "UPDATE chats SET
                 name = COALESCE(?2, name),
                 bio = COALESCE(?3, bio),
                 profile_image = COALESCE(?4, profile_image),
                 chat_privacy = COALESCE(?5, chat_privacy),
                 updated_at = ?6
             WHERE id = ?1",
            params![
                id.to_string(),
                name,
                bio,
                profile_image,
                privacy.map(ChatPrivacy::as_str),
                ts(&Utc::now()),
            ],
        )?;
        if affected == 0 {
            return Ok(None);
        }

        let chat = load_chat(&tx, id)?;
        tx.commit()?;
        Ok(chat)
    }

    pub fn set_chat_status(&self, id: ChatId, status: ChatStatus) -> Result<Option<Chat>> {
        let tx = self.conn().unchecked_transaction()?;
        let affected = tx.execute(
            "UPDATE chats SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), status.as_str(), ts(&Utc::now())],
        )?;
        if affected == 0 {
            return Ok(None);
        }

        let chat = load_chat(&tx, id)?;
        tx.commit()?;
        Ok(chat)
    }

    /// Set-insert `user` into `set`. Inserting a present id changes nothing.
    pub fn add_to_chat_set(&self, id: ChatId, set: ChatSet, user: UserId) -> Result<Option<Chat>> {
        let tx = self.conn().unchecked_transaction()?;
        let now = ts(&Utc::now());
        if !touch_chat(&tx, id, &now)? {
            return Ok(None);
        }

        insert_member(&tx, id, set, user, &now)?;

        let chat = load_chat(&tx, id)?;
        tx.commit()?;
        Ok(chat)
    }

    /// Set-remove `user` from every set in `sets`. Removing an absent id
    /// changes nothing.
    pub fn pull_from_chat_sets(
        &self,
        id: ChatId,
        sets: &[ChatSet],
        user: UserId,
    ) -> Result<Option<Chat>> {
        let tx = self.conn().unchecked_transaction()?;
        if !touch_chat(&tx, id, &ts(&Utc::now()))? {
            return Ok(None);
        }

        for set in sets {
            tx.execute(
                "DELETE FROM chat_sets WHERE chat_id = ?1 AND set_name = ?2 AND user_id = ?3",
                params![id.to_string(), set.as_str(), user.to_string()],
            )?;
        }

        let chat = load_chat(&tx, id)?;
        tx.commit()?;
        Ok(chat)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn touch_chat(conn: &Connection, id: ChatId, now: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE chats SET updated_at = ?2 WHERE id = ?1",
        params![id.to_string(), now],
    )?;
    Ok(affected > 0)
}

fn insert_member(
    conn: &Connection,
    id: ChatId,
    set: ChatSet,
    user: UserId,
    added_at: &str,
) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO chat_sets (chat_id, set_name, user_id, added_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![id.to_string(), set.as_str(), user.to_string(), added_at],
    )?;
    Ok(())
}

fn load_chat(conn: &Connection, id: ChatId) -> Result<Option<Chat>> {
    let sql = format!("SELECT {CHAT_COLUMNS} FROM chats WHERE id = ?1");
    let chat = conn
        .query_row(&sql, params![id.to_string()], row_to_chat)
        .optional()?;

    match chat {
        Some(mut chat) => {
            load_sets(conn, &mut chat)?;
            Ok(Some(chat))
        }
        None => Ok(None),
    }
}

fn load_sets(conn: &Connection, chat: &mut Chat) -> Result<()> {
    let mut stmt = conn.prepare("SELECT set_name, user_id FROM chat_sets WHERE chat_id = ?1")?;
    let rows = stmt.query_map(params![chat.id.to_string()], |row| {
        let set_name: String = row.get(0)?;
        Ok((set_name, get_uuid(row, 1)?))
    })?;

    for row in rows {
        let (set_name, user) = row?;
        match ChatSet::from_name(&set_name) {
            Some(set) => {
                set.members_mut(chat).insert(UserId(user));
            }
            None => tracing::warn!(chat_id = %chat.id, set = %set_name, "unknown chat set"),
        }
    }
    Ok(())
}

/// Map a `rusqlite::Row` selected with `CHAT_COLUMNS` to a [`Chat`] with
/// empty sets.
fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    Ok(Chat {
        id: ChatId(get_uuid(row, 0)?),
        name: row.get(1)?,
        bio: row.get(2)?,
        profile_image: row.get(3)?,
        chat_type: get_enum(row, 4)?,
        chat_privacy: get_enum(row, 5)?,
        status: get_enum(row, 6)?,
        is_verified: row.get(7)?,
        creator: UserId(get_uuid(row, 8)?),
        users: BTreeSet::new(),
        admins: BTreeSet::new(),
        bookmark: BTreeSet::new(),
        reports: BTreeSet::new(),
        created_at: get_ts(row, 9)?,
        updated_at: get_ts(row, 10)?,
    })
}
