use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CommandError, Result};
use crate::tag::CommandTag;

/// Frame header: tag (4) + big-endian signed length (4) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Length marker for a payload whose size is not known up front.
///
/// Legal on the write path; on the read path the payload extends to
/// transport EOF.
pub const UNKNOWN_LENGTH: i32 = -1;

/// A framed command before tag dispatch.
#[derive(Debug, Clone)]
pub struct RawCommand {
    /// The 4-character command tag.
    pub tag: CommandTag,
    /// The command payload.
    pub payload: Bytes,
}

impl RawCommand {
    /// Create a new raw command.
    pub fn new(tag: CommandTag, payload: impl Into<Bytes>) -> Self {
        Self {
            tag,
            payload: payload.into(),
        }
    }

    /// The total wire size of this command (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a command into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────────┬──────────────────┐
/// │ Tag (4B)     │ Length        │ Payload          │
/// │ ASCII        │ (4B BE, i32)  │ (Length bytes)   │
/// └──────────────┴───────────────┴──────────────────┘
/// ```
pub fn encode_command(tag: CommandTag, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > i32::MAX as usize {
        return Err(CommandError::PayloadTooLarge {
            size: payload.len(),
            max: i32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&tag.as_bytes());
    dst.put_i32(payload.len() as i32);
    dst.put_slice(payload);
    Ok(())
}

/// Encode a command with the unknown-length marker.
///
/// The receiver reads the payload up to transport EOF, so a frame encoded
/// this way must be the last one on its stream.
pub fn encode_command_unknown_length(
    tag: CommandTag,
    payload: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&tag.as_bytes());
    dst.put_i32(UNKNOWN_LENGTH);
    dst.put_slice(payload);
    Ok(())
}

/// Decode a command from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete command yet.
/// On success, consumes the command bytes from the buffer. `at_eof` tells
/// the decoder the transport has closed, which is what delimits an
/// unknown-length payload.
pub fn decode_command(
    src: &mut BytesMut,
    max_payload: usize,
    at_eof: bool,
) -> Result<Option<RawCommand>> {
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    let tag = CommandTag::new([src[0], src[1], src[2], src[3]]);
    if !tag.is_printable() {
        return Err(CommandError::InvalidTag(tag));
    }

    let length = i32::from_be_bytes(src[4..8].try_into().unwrap());

    if length == UNKNOWN_LENGTH {
        if !at_eof {
            return Ok(None); // Delimited by EOF
        }
        src.advance(HEADER_SIZE);
        let len = src.len();
        let payload = src.split_to(len).freeze();
        return Ok(Some(RawCommand { tag, payload }));
    }

    if length < 0 {
        return Err(CommandError::InvalidLength(length));
    }

    let payload_len = length as usize;
    if payload_len > max_payload {
        return Err(CommandError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(RawCommand { tag, payload }))
}

/// Configuration for the command codec.
#[derive(Debug, Clone)]
pub struct CommandConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}
