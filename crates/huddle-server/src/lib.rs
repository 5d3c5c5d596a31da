//! # huddle-server
//!
//! Conversation membership and moderation backend.
//!
//! - **Engine**: conversation lifecycle, role toggles, discovery and account
//!   rules on top of `huddle-store`
//! - **REST API** (axum) exposing every engine operation behind signed
//!   session tokens
//! - **Media store** for profile and conversation images
//! - **Operator API** for status moderation, guarded by a static admin token

pub mod api;
pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod media_store;
pub mod password;
