//! Connection lifecycle and docking handshake.
//!
//! A [`Pipe`] owns one command layer over a byte transport and walks an
//! explicit connection state machine; its [`DockingProtocol`] drives the
//! multi-step handshake (version negotiation, identity exchange, password
//! verification) to steady state inside the read loop. Timers run on the
//! shared scheduler of an explicitly started [`LinkContext`].

pub mod context;
pub mod docking;
pub mod error;
pub mod pipe;
pub mod transport;

pub use context::{LinkContext, TimerHandle};
pub use docking::{
    Cipher, DockingProtocol, HandshakeConfig, HandshakeState, SessionInfo,
    MINIMUM_PROTOCOL_VERSION, PROTOCOL_VERSION,
};
pub use error::{PipeError, Result};
pub use pipe::{KeepaliveMode, Pipe, PipeConfig, PipeState};
pub use transport::{LinkTransport, TransportStream};

#[cfg(unix)]
pub use transport::SocketTransport;
