//! CRUD operations for [`User`] records.

use std::collections::BTreeSet;

use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use huddle_shared::types::{AccountType, ChatId, Page, UserId, UserStatus};

use crate::chats::ChatSet;
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{PublicProfile, User};
use crate::sql::{get_enum, get_ts, get_uuid, like_pattern, ts};

const USER_COLUMNS: &str = "id, name, username, email, password_hash, profile_image, bio, \
                            status, account_type, created_at, updated_at";

const PROFILE_COLUMNS: &str = "users.id, users.name, users.username, users.profile_image, users.bio";

/// Fields needed to register an account.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub name: &'a str,
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
}

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new active account. A username or email already held by a
    /// non-deleted account yields [`StoreError::Duplicate`].
    pub fn create_user(&self, new: &NewUser<'_>) -> Result<User> {
        let now = Utc::now();
        let user = User {
            id: UserId::new(),
            name: new.name.to_string(),
            username: new.username.to_string(),
            email: new.email.to_string(),
            password_hash: new.password_hash.to_string(),
            profile_image: None,
            bio: String::new(),
            status: UserStatus::Active,
            account_type: AccountType::None,
            reports: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        };

        self.conn()
            .execute(
                "INSERT INTO users (id, name, username, email, password_hash, profile_image,
                                    bio, status, account_type, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL, '', ?6, ?7, ?8, ?8)",
                params![
                    user.id.to_string(),
                    user.name,
                    user.username,
                    user.email,
                    user.password_hash,
                    user.status.as_str(),
                    user.account_type.as_str(),
                    ts(&now),
                ],
            )
            .map_err(StoreError::from_write)?;

        Ok(user)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_user(&self, id: UserId) -> Result<Option<User>> {
        load_user(self.conn(), id)
    }

    /// Find a non-deleted account whose email or username equals `info`.
    pub fn find_user_by_login(&self, info: &str) -> Result<Option<User>> {
        let id: Option<String> = self
            .conn()
            .query_row(
                "SELECT id FROM users
                 WHERE (email = ?1 OR username = ?1) AND status != 'delete'
                 LIMIT 1",
                params![info],
                |row| row.get(0),
            )
            .optional()?;

        match id {
            Some(id) => self.get_user_by_raw_id(&id),
            None => Ok(None),
        }
    }

    /// Non-deleted account holding either the email or the username.
    pub fn find_live_user_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> Result<Option<User>> {
        let id: Option<String> = self
            .conn()
            .query_row(
                "SELECT id FROM users
                 WHERE (email = ?1 OR username = ?2) AND status != 'delete'
                 LIMIT 1",
                params![email, username],
                |row| row.get(0),
            )
            .optional()?;

        match id {
            Some(id) => self.get_user_by_raw_id(&id),
            None => Ok(None),
        }
    }

    fn get_user_by_raw_id(&self, raw: &str) -> Result<Option<User>> {
        match raw.parse::<UserId>() {
            Ok(id) => self.get_user(id),
            Err(_) => Ok(None),
        }
    }

    /// Active accounts in one of a chat's id-sets, public fields only,
    /// newest account first.
    pub fn list_profiles_in_chat_set(
        &self,
        chat_id: ChatId,
        set: ChatSet,
        page: Page,
    ) -> Result<Vec<PublicProfile>> {
        let sql = format!(
            "SELECT {PROFILE_COLUMNS}
             FROM users
             JOIN chat_sets ON chat_sets.user_id = users.id
             WHERE chat_sets.chat_id = ?1
               AND chat_sets.set_name = ?2
               AND users.status = 'active'
             ORDER BY users.created_at DESC, users.rowid DESC
             LIMIT {} OFFSET {}",
            page.limit,
            page.offset()
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(
            params![chat_id.to_string(), set.as_str()],
            row_to_profile,
        )?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Active accounts whose name or username contains `term`
    /// (ASCII case-insensitive), minus `exclude`.
    pub fn search_users(
        &self,
        term: Option<&str>,
        exclude: Option<UserId>,
        page: Page,
    ) -> Result<Vec<PublicProfile>> {
        let (clause, args) = search_clause(term, exclude);
        let sql = format!(
            "SELECT {PROFILE_COLUMNS} FROM users WHERE {clause}
             ORDER BY users.created_at DESC, users.rowid DESC
             LIMIT {} OFFSET {}",
            page.limit,
            page.offset()
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), row_to_profile)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn count_users(&self, term: Option<&str>, exclude: Option<UserId>) -> Result<u64> {
        let (clause, args) = search_clause(term, exclude);
        let sql = format!("SELECT COUNT(*) FROM users WHERE {clause}");
        let count: i64 = self
            .conn()
            .query_row(&sql, params_from_iter(args.iter()), |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Replace only the supplied fields. Returns `None` if the user is gone.
    pub fn update_user_profile(
        &self,
        id: UserId,
        name: Option<&str>,
        bio: Option<&str>,
        profile_image: Option<&str>,
    ) -> Result<Option<User>> {
        self.update_user(
            id,
            "name = COALESCE(?2, name),
             bio = COALESCE(?3, bio),
             profile_image = COALESCE(?4, profile_image)",
            &[name, bio, profile_image],
        )
    }

    pub fn set_user_password(&self, id: UserId, password_hash: &str) -> Result<Option<User>> {
        self.update_user(id, "password_hash = ?2", &[Some(password_hash)])
    }

    pub fn set_user_status(&self, id: UserId, status: UserStatus) -> Result<Option<User>> {
        self.update_user(id, "status = ?2", &[Some(status.as_str())])
    }

    pub fn set_account_type(&self, id: UserId, account_type: AccountType) -> Result<Option<User>> {
        self.update_user(id, "account_type = ?2", &[Some(account_type.as_str())])
    }

    /// Set-insert `reporter` into the user's reports.
    pub fn add_user_report(&self, id: UserId, reporter: UserId) -> Result<Option<User>> {
        self.mutate_user_reports(id, reporter, true)
    }

    /// Set-remove `reporter` from the user's reports.
    pub fn remove_user_report(&self, id: UserId, reporter: UserId) -> Result<Option<User>> {
        self.mutate_user_reports(id, reporter, false)
    }

    /// `assignments` uses `?1` for the id and `?2..` for `values`, then the
    /// row is re-read in the same transaction.
    fn update_user(
        &self,
        id: UserId,
        assignments: &str,
        values: &[Option<&str>],
    ) -> Result<Option<User>> {
        let tx = self.conn().unchecked_transaction()?;
        let now_idx = values.len() + 2;
        let sql = format!("UPDATE users SET {assignments}, updated_at = ?{now_idx} WHERE id = ?1");

        let id_text = id.to_string();
        let now = ts(&Utc::now());
        let mut args: Vec<Option<&str>> = Vec::with_capacity(values.len() + 2);
        args.push(Some(id_text.as_str()));
        args.extend_from_slice(values);
        args.push(Some(now.as_str()));

        let affected = tx
            .execute(&sql, params_from_iter(args.iter()))
            .map_err(StoreError::from_write)?;
        if affected == 0 {
            return Ok(None);
        }

        let user = load_user(&tx, id)?;
        tx.commit()?;
        Ok(user)
    }

    fn mutate_user_reports(&self, id: UserId, reporter: UserId, insert: bool) -> Result<Option<User>> {
        let tx = self.conn().unchecked_transaction()?;
        let now = ts(&Utc::now());

        let affected = tx.execute(
            "UPDATE users SET updated_at = ?2 WHERE id = ?1",
            params![id.to_string(), now],
        )?;
        if affected == 0 {
            return Ok(None);
        }

        if insert {
            tx.execute(
                "INSERT OR IGNORE INTO user_reports (user_id, reporter_id, created_at)
                 VALUES (?1, ?2, ?3)",
                params![id.to_string(), reporter.to_string(), now],
            )?;
        } else {
            tx.execute(
                "DELETE FROM user_reports WHERE user_id = ?1 AND reporter_id = ?2",
                params![id.to_string(), reporter.to_string()],
            )?;
        }

        let user = load_user(&tx, id)?;
        tx.commit()?;
        Ok(user)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn search_clause(term: Option<&str>, exclude: Option<UserId>) -> (String, Vec<String>) {
    let mut clauses = vec!["users.status = 'active'".to_string()];
    let mut args = Vec::new();

    if let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) {
        args.push(like_pattern(term));
        let n = args.len();
        clauses.push(format!(
            "(users.name LIKE ?{n} ESCAPE '\\' OR users.username LIKE ?{n} ESCAPE '\\')"
        ));
    }
    if let Some(exclude) = exclude {
        args.push(exclude.to_string());
        clauses.push(format!("users.id != ?{}", args.len()));
    }

    (clauses.join(" AND "), args)
}

pub(crate) fn load_user(conn: &Connection, id: UserId) -> Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    let user = conn
        .query_row(&sql, params![id.to_string()], row_to_user)
        .optional()?;

    let Some(mut user) = user else {
        return Ok(None);
    };

    let mut stmt = conn.prepare("SELECT reporter_id FROM user_reports WHERE user_id = ?1")?;
    let rows = stmt.query_map(params![id.to_string()], |row| get_uuid(row, 0))?;
    for row in rows {
        user.reports.insert(UserId(row?));
    }

    Ok(Some(user))
}

/// Map a `rusqlite::Row` selected with `USER_COLUMNS` to a [`User`].
/// `reports` is filled in separately.
fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId(get_uuid(row, 0)?),
        name: row.get(1)?,
        username: row.get(2)?,
        email: row.get(3)?,
        password_hash: row.get(4)?,
        profile_image: row.get(5)?,
        bio: row.get(6)?,
        status: get_enum(row, 7)?,
        account_type: get_enum(row, 8)?,
        reports: BTreeSet::new(),
        created_at: get_ts(row, 9)?,
        updated_at: get_ts(row, 10)?,
    })
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<PublicProfile> {
    Ok(PublicProfile {
        id: UserId(get_uuid(row, 0)?),
        name: row.get(1)?,
        username: row.get(2)?,
        profile_image: row.get(3)?,
        bio: row.get(4)?,
    })
}
