//! Infrastructure layer for Parley.
//!
//! Implementations of the ports defined in `parley-core`: the websocket
//! gateway connector, the HTTP session repository, and config file loading.

pub mod config;
pub mod http;
pub mod ws;
