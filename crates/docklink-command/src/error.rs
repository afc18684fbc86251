use crate::tag::CommandTag;

/// Errors that can occur while framing, decoding or dispatching commands.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The frame header's tag bytes are not printable ASCII.
    #[error("invalid command tag {0}")]
    InvalidTag(CommandTag),

    /// A negative frame length other than the unknown-length marker.
    #[error("invalid frame length {0}")]
    InvalidLength(i32),

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A known command whose payload is shorter than its fixed fields.
    #[error("truncated {tag} payload")]
    TruncatedPayload { tag: CommandTag },

    /// An embedded NSOF object failed to decode or encode.
    #[error("object codec error: {0}")]
    Nsof(#[from] docklink_nsof::NsofError),

    /// An I/O error occurred while reading or writing frames.
    #[error("command I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport closed before a complete command was received.
    #[error("connection closed (incomplete command)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, CommandError>;
