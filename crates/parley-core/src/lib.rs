//! Chat session engine for Parley.
//!
//! This crate defines the "ports" (socket connector, token provider,
//! session repository) that the infrastructure layer implements, and the
//! engine built on them: the gateway frame codec, the connection
//! supervisor, the chat transport, the history pager, the message timeline
//! and the session controller. It depends only on `parley-types` -- never
//! on `parley-infra` or any network crate.

pub mod chat;
pub mod connection;
pub mod event;
pub mod protocol;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;
