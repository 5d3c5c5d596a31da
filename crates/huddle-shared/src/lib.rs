//! # huddle-shared
//!
//! Types shared by the store and the server: identifiers, conversation and
//! account enums with their status transition tables, pagination, and the
//! signed session tokens used to authenticate callers.

pub mod constants;
pub mod error;
pub mod session;
pub mod types;
