//! Command framing and dispatch for the docking protocol.
//!
//! Every exchange on the link is a tagged frame: a 4-character ASCII tag, a
//! big-endian signed payload length, then the payload — either fixed binary
//! fields or one embedded NSOF object. This crate turns a byte transport
//! into a stream of typed, dispatched commands and serializes outbound
//! replies.

pub mod codec;
pub mod command;
pub mod error;
pub mod layer;
pub mod reader;
pub mod tag;
pub mod writer;

pub use codec::{
    decode_command, encode_command, encode_command_unknown_length, CommandConfig, RawCommand,
    DEFAULT_MAX_PAYLOAD, HEADER_SIZE, UNKNOWN_LENGTH,
};
pub use command::{
    AppDescriptor, DesktopCommand, DesktopInfo, DesktopType, DeviceCommand, DeviceIdentity,
    IconMask, SessionType,
};
pub use error::{CommandError, Result};
pub use layer::{CommandLayer, CommandListener, CommandSender, LayerEvent};
pub use reader::CommandReader;
pub use tag::CommandTag;
pub use writer::CommandWriter;
