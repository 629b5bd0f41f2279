//! Shared domain types for Parley.
//!
//! This crate contains the types exchanged between the chat engine, its
//! collaborators and its callers: messages, pages, connection and
//! pagination state, configuration, and the error enums.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod config;
pub mod connection;
pub mod error;
pub mod message;
pub mod page;
