//! Gateway connection management.
//!
//! - [`socket`]: the `Connector` port that opens a socket as reader/writer halves.
//! - [`token`]: the `TokenProvider` port consulted on every (re)connect.
//! - [`supervisor`]: the actor owning the socket, heartbeat and reconnect policy.

pub mod socket;
pub mod supervisor;
pub mod token;

pub use socket::{Connector, SocketReader, SocketWriter};
pub use supervisor::{ConnectionSupervisor, SupervisorConfig};
pub use token::{TokenCell, TokenProvider};
