use std::io::{ErrorKind, Read};

use bytes::BytesMut;

use crate::codec::{decode_command, CommandConfig, RawCommand};
use crate::error::{CommandError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete command frames from any `Read` stream.
///
/// Handles partial reads internally — callers always get complete commands.
pub struct CommandReader<T> {
    inner: T,
    buf: BytesMut,
    config: CommandConfig,
}

impl<T: Read> CommandReader<T> {
    /// Create a new command reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, CommandConfig::default())
    }

    /// Create a new command reader with explicit configuration.
    pub fn with_config(inner: T, config: CommandConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete command (blocking).
    ///
    /// Returns `Err(CommandError::ConnectionClosed)` when EOF is reached.
    /// An unknown-length frame is yielded at EOF with whatever payload bytes
    /// arrived before the close.
    pub fn read_command(&mut self) -> Result<RawCommand> {
        loop {
            if let Some(command) =
                decode_command(&mut self.buf, self.config.max_payload_size, false)?
            {
                return Ok(command);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(CommandError::Io(err)),
            };

            if read == 0 {
                if let Some(command) =
                    decode_command(&mut self.buf, self.config.max_payload_size, true)?
                {
                    return Ok(command);
                }
                return Err(CommandError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current reader configuration.
    pub fn config(&self) -> &CommandConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::codec::{encode_command, encode_command_unknown_length, DEFAULT_MAX_PAYLOAD};
    use crate::tag;

    fn wire(parts: &[(crate::tag::CommandTag, &[u8])]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for (tag, payload) in parts {
            encode_command(*tag, payload, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[test]
    fn read_single_command() {
        let mut reader = Cursor::new(wire(&[(tag::HELLO, b"")]));
        let mut reader = CommandReader::new(&mut reader);
        let command = reader.read_command().unwrap();

        assert_eq!(command.tag, tag::HELLO);
        assert!(command.payload.is_empty());
    }

    #[test]
    fn read_multiple_commands() {
        let bytes = wire(&[
            (tag::REQUEST_TO_DOCK, &9u32.to_be_bytes()),
            (tag::HELLO, b""),
            (tag::DISCONNECT, b""),
        ]);
        let mut reader = CommandReader::new(Cursor::new(bytes));

        assert_eq!(reader.read_command().unwrap().tag, tag::REQUEST_TO_DOCK);
        assert_eq!(reader.read_command().unwrap().tag, tag::HELLO);
        assert_eq!(reader.read_command().unwrap().tag, tag::DISCONNECT);
    }

    #[test]
    fn partial_read_handling() {
        let bytes = wire(&[(tag::PASSWORD, &[1, 2, 3, 4, 5, 6, 7, 8])]);
        let mut reader = CommandReader::new(ByteByByteReader { bytes, pos: 0 });

        let command = reader.read_command().unwrap();
        assert_eq!(command.tag, tag::PASSWORD);
        assert_eq!(command.payload.as_ref(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = CommandReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_command().unwrap_err();
        assert!(matches!(err, CommandError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_command() {
        let mut bytes = wire(&[(tag::PASSWORD, &[1, 2, 3, 4, 5, 6, 7, 8])]);
        bytes.truncate(10);

        let mut reader = CommandReader::new(Cursor::new(bytes));
        let err = reader.read_command().unwrap_err();
        assert!(matches!(err, CommandError::ConnectionClosed));
    }

    #[test]
    fn unknown_length_command_yields_at_eof() {
        let mut buf = BytesMut::new();
        encode_command_unknown_length(tag::DISCONNECT, b"remainder", &mut buf).unwrap();

        let mut reader = CommandReader::new(Cursor::new(buf.to_vec()));
        let command = reader.read_command().unwrap();
        assert_eq!(command.tag, tag::DISCONNECT);
        assert_eq!(command.payload.as_ref(), b"remainder");
    }

    #[test]
    fn interrupted_read_retries() {
        let bytes = wire(&[(tag::HELLO, b"")]);
        let mut reader = CommandReader::new(InterruptedThenData {
            interrupted: false,
            bytes,
            pos: 0,
        });

        let command = reader.read_command().unwrap();
        assert_eq!(command.tag, tag::HELLO);
    }

    #[test]
    fn oversized_command_in_stream() {
        let mut buf = BytesMut::new();
        buf.put_slice(b"name");
        buf.put_i32(1024);

        let config = CommandConfig {
            max_payload_size: 16,
        };
        let mut reader = CommandReader::with_config(Cursor::new(buf.to_vec()), config);
        let err = reader.read_command().unwrap_err();
        assert!(matches!(err, CommandError::PayloadTooLarge { .. }));
    }

    #[test]
    fn garbage_header_in_stream() {
        let bytes = vec![0x00, 0x01, 0x02, 0x03, 0, 0, 0, 0];
        let mut reader = CommandReader::new(Cursor::new(bytes));
        let err = reader.read_command().unwrap_err();
        assert!(matches!(err, CommandError::InvalidTag(_)));
    }

    #[test]
    fn accessors_and_into_inner() {
        let cursor = Cursor::new(Vec::<u8>::new());
        let mut reader = CommandReader::new(cursor);

        let _ = reader.get_ref();
        let _ = reader.get_mut();
        assert_eq!(reader.config().max_payload_size, DEFAULT_MAX_PAYLOAD);
        let _inner = reader.into_inner();
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            if self.pos >= self.bytes.len() {
                return Ok(0);
            }
            let n = (self.bytes.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }
}
