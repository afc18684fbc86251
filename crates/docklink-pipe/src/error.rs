use std::time::Duration;

/// Errors that can occur in connection and handshake operations.
#[derive(Debug, thiserror::Error)]
pub enum PipeError {
    /// Operation invalid for the current connection state, or a command
    /// that does not match the handshake step in progress.
    #[error("{operation} is invalid in state {state}")]
    BadPipeState { operation: String, state: String },

    /// Write or read attempted outside a can-send state.
    #[error("pipe is not connected")]
    NotConnected,

    /// Operation attempted after teardown completed.
    #[error("pipe is disconnected")]
    Disconnected,

    /// No activity within the idle window.
    #[error("idle timeout after {0:?}")]
    Timeout(Duration),

    /// The peer requested a protocol version below the supported floor.
    #[error("unsupported protocol version {requested} (minimum {minimum})")]
    ProtocolVersion { requested: u32, minimum: u32 },

    /// Password verification failed; no retries remain.
    #[error("password verification failed")]
    BadPassword,

    /// Password verification failed; the peer may retry.
    #[error("password verification failed, retry permitted")]
    RetryPassword,

    /// The peer acknowledged a step with a non-zero result code.
    #[error("device reported error {0}")]
    DeviceError(i32),

    /// Timers require a started link context.
    #[error("link context is not started")]
    ContextNotStarted,

    /// Command-layer error.
    #[error("command layer error: {0}")]
    Command(#[from] docklink_command::CommandError),

    /// Embedded object codec error.
    #[error("object codec error: {0}")]
    Nsof(#[from] docklink_nsof::NsofError),

    /// Transport-level I/O error.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipeError>;
