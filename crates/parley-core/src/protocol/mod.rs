//! Gateway wire protocol.
//!
//! Text frames exchanged over the gateway socket, decoded into a closed
//! [`Frame`] enum by [`FrameCodec`].

pub mod frame;

pub use frame::{Frame, FrameCodec, HandshakeInfo};
