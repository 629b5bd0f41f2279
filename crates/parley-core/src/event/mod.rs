//! Broadcast plumbing for engine events.
//!
//! Provides a generic [`EventBus`] used for connection-state changes,
//! inbound chat messages and gateway notices.

pub mod bus;

pub use bus::EventBus;
