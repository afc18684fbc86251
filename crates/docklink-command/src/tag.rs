//! Command tag constants.
//!
//! Tags are 4 printable ASCII characters. The constants here cover every
//! command the protocol engine itself speaks; steady-state traffic for other
//! tags is surfaced to consumers as raw commands.

use std::fmt;

/// A 4-character ASCII command tag.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandTag(pub [u8; 4]);

impl CommandTag {
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> [u8; 4] {
        self.0
    }

    /// All four bytes are printable ASCII.
    pub fn is_printable(&self) -> bool {
        self.0.iter().all(|b| b.is_ascii_graphic())
    }
}

impl fmt::Display for CommandTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() {
                write!(f, "{}", char::from(b))?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for CommandTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandTag({self})")
    }
}

/// Device asks to begin a docking session.
pub const REQUEST_TO_DOCK: CommandTag = CommandTag::new(*b"rtdk");

/// Desktop reply selecting the session type.
pub const INITIATE_DOCKING: CommandTag = CommandTag::new(*b"dock");

/// Device identity block and name.
pub const DEVICE_NAME: CommandTag = CommandTag::new(*b"name");

/// Desktop identity, challenge key and application list.
pub const DESKTOP_INFO: CommandTag = CommandTag::new(*b"dinf");

/// Device's negotiated version and ciphered challenge.
pub const DEVICE_INFO: CommandTag = CommandTag::new(*b"ninf");

/// Desktop selection of feature icons to surface.
pub const WHICH_ICONS: CommandTag = CommandTag::new(*b"wicn");

/// Result code acknowledgment.
pub const RESULT: CommandTag = CommandTag::new(*b"dres");

/// Desktop's requested idle-timeout value.
pub const SET_TIMEOUT: CommandTag = CommandTag::new(*b"stim");

/// Password verification exchange, both directions.
pub const PASSWORD: CommandTag = CommandTag::new(*b"pass");

/// Keepalive, both directions.
pub const HELLO: CommandTag = CommandTag::new(*b"helo");

/// Orderly session teardown.
pub const DISCONNECT: CommandTag = CommandTag::new(*b"disc");

/// Device canceled the operation in progress.
pub const OPERATION_CANCELED: CommandTag = CommandTag::new(*b"opca");
