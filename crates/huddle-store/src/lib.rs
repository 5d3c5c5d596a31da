//! # huddle-store
//!
//! SQLite persistence for users and conversations.
//!
//! The crate exposes a synchronous [`Database`] handle wrapping a
//! `rusqlite::Connection`. Conversation membership, admin, bookmark and
//! report sets live in one keyed table, so adding an id twice or removing an
//! absent id is a no-op at the storage layer.

pub mod chats;
pub mod database;
pub mod migrations;
pub mod models;
pub mod users;

mod error;
mod sql;

pub use chats::{ChatFilter, ChatSet};
pub use database::Database;
pub use error::StoreError;
pub use models::*;
pub use users::NewUser;
