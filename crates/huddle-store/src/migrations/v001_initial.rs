//! v001 -- Initial schema.
//!
//! Users and chats are plain rows. Every id-set a record owns (chat members,
//! admins, bookmarks, reports; user reports) is a keyed table, so set inserts
//! are `INSERT OR IGNORE` and set removals are `DELETE`.

use rusqlite::Connection;

const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    name          TEXT NOT NULL,
    username      TEXT NOT NULL,
    email         TEXT NOT NULL,
    password_hash TEXT NOT NULL,               -- argon2 PHC string
    profile_image TEXT,
    bio           TEXT NOT NULL DEFAULT '',
    status        TEXT NOT NULL DEFAULT 'active',
    account_type  TEXT NOT NULL DEFAULT 'none',
    created_at    TEXT NOT NULL,               -- RFC-3339, microseconds
    updated_at    TEXT NOT NULL
);

-- Unique among accounts that are not soft-deleted.
CREATE UNIQUE INDEX IF NOT EXISTS idx_users_username_live
    ON users(username) WHERE status != 'delete';
CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email_live
    ON users(email) WHERE status != 'delete';
CREATE INDEX IF NOT EXISTS idx_users_status ON users(status, created_at DESC);

CREATE TABLE IF NOT EXISTS user_reports (
    user_id     TEXT NOT NULL,                 -- FK -> users(id)
    reporter_id TEXT NOT NULL,
    created_at  TEXT NOT NULL,

    PRIMARY KEY (user_id, reporter_id),
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Chats
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chats (
    id            TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    name          TEXT NOT NULL,
    bio           TEXT NOT NULL DEFAULT '',
    profile_image TEXT,
    chat_type     TEXT NOT NULL,               -- single | group | channel
    chat_privacy  TEXT NOT NULL DEFAULT 'open',
    status        TEXT NOT NULL DEFAULT 'active',
    is_verified   INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    creator       TEXT NOT NULL,               -- FK -> users(id)
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,

    FOREIGN KEY (creator) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_chats_name ON chats(name);
CREATE INDEX IF NOT EXISTS idx_chats_type_status ON chats(chat_type, status);
CREATE INDEX IF NOT EXISTS idx_chats_status_created ON chats(status, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_chats_creator ON chats(creator);

-- users | admins | bookmark | reports
CREATE TABLE IF NOT EXISTS chat_sets (
    chat_id  TEXT NOT NULL,                    -- FK -> chats(id)
    set_name TEXT NOT NULL,
    user_id  TEXT NOT NULL,
    added_at TEXT NOT NULL,

    PRIMARY KEY (chat_id, set_name, user_id),
    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_chat_sets_user ON chat_sets(set_name, user_id);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
