use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{encode_command, CommandConfig, RawCommand};
use crate::command::DesktopCommand;
use crate::error::{CommandError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete command frames to any `Write` stream.
pub struct CommandWriter<T> {
    inner: T,
    buf: BytesMut,
    config: CommandConfig,
}

impl<T: Write> CommandWriter<T> {
    /// Create a new command writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, CommandConfig::default())
    }

    /// Create a new command writer with explicit configuration.
    pub fn with_config(inner: T, config: CommandConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Serialize and send a typed command (blocking).
    pub fn write(&mut self, command: &DesktopCommand) -> Result<()> {
        self.write_raw(&command.encode()?)
    }

    /// Send a raw command frame (blocking).
    pub fn write_raw(&mut self, command: &RawCommand) -> Result<()> {
        if command.payload.len() > self.config.max_payload_size {
            return Err(CommandError::PayloadTooLarge {
                size: command.payload.len(),
                max: self.config.max_payload_size,
            });
        }

        self.buf.clear();
        encode_command(command.tag, command.payload.as_ref(), &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(CommandError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(CommandError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(CommandError::Io(err)),
            }
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

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current writer configuration.
    pub fn config(&self) -> &CommandConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;

    use super::*;
    use crate::codec::{decode_command, DEFAULT_MAX_PAYLOAD};
    use crate::command::SessionType;
    use crate::reader::CommandReader;
    use crate::tag;

    #[test]
    fn write_typed_command() {
        let mut writer = CommandWriter::new(Cursor::new(Vec::<u8>::new()));
        writer
            .write(&DesktopCommand::InitiateDocking {
                session: SessionType::Synchronize,
            })
            .unwrap();

        let mut wire = BytesMut::from(writer.into_inner().into_inner().as_slice());
        let raw = decode_command(&mut wire, DEFAULT_MAX_PAYLOAD, false)
            .unwrap()
            .unwrap();
        assert_eq!(raw.tag, tag::INITIATE_DOCKING);
        assert_eq!(raw.payload.as_ref(), &2u32.to_be_bytes());
    }

    #[test]
    fn write_multiple_commands() {
        let mut writer = CommandWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.write(&DesktopCommand::Hello).unwrap();
        writer
            .write(&DesktopCommand::SetTimeout { seconds: 30 })
            .unwrap();

        let mut wire = BytesMut::from(writer.into_inner().into_inner().as_slice());
        let first = decode_command(&mut wire, DEFAULT_MAX_PAYLOAD, false)
            .unwrap()
            .unwrap();
        let second = decode_command(&mut wire, DEFAULT_MAX_PAYLOAD, false)
            .unwrap()
            .unwrap();
        assert_eq!(first.tag, tag::HELLO);
        assert_eq!(second.tag, tag::SET_TIMEOUT);
        assert_eq!(second.payload.as_ref(), &30u32.to_be_bytes());
    }

    #[test]
    fn payload_too_large_rejected() {
        let config = CommandConfig {
            max_payload_size: 4,
        };
        let mut writer = CommandWriter::with_config(Cursor::new(Vec::<u8>::new()), config);
        let raw = RawCommand::new(tag::PASSWORD, vec![0u8; 16]);
        let err = writer.write_raw(&raw).unwrap_err();
        assert!(matches!(err, CommandError::PayloadTooLarge { .. }));
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = CommandWriter::new(ZeroWriter);
        let err = writer.write(&DesktopCommand::Hello).unwrap_err();
        assert!(matches!(err, CommandError::ConnectionClosed));
    }

    #[test]
    fn handles_interrupted_write_and_flush() {
        let inner = InterruptedWriteThenFlush {
            wrote_once: false,
            flush_interrupted: false,
            data: Vec::new(),
        };
        let mut writer = CommandWriter::new(inner);
        writer.write(&DesktopCommand::Hello).unwrap();
        assert!(!writer.get_ref().data.is_empty());
    }

    #[test]
    fn written_bytes_read_back() {
        let mut writer = CommandWriter::new(Cursor::new(Vec::<u8>::new()));
        writer
            .write(&DesktopCommand::Password {
                encrypted_key: 0x1122_3344_5566_7788,
            })
            .unwrap();

        let wire = writer.into_inner().into_inner();
        let mut reader = CommandReader::new(Cursor::new(wire));
        let raw = reader.read_command().unwrap();
        assert_eq!(raw.tag, tag::PASSWORD);
        assert_eq!(raw.payload.as_ref(), &0x1122_3344_5566_7788u64.to_be_bytes());
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct InterruptedWriteThenFlush {
        wrote_once: bool,
        flush_interrupted: bool,
        data: Vec<u8>,
    }

    impl Write for InterruptedWriteThenFlush {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.wrote_once {
                self.wrote_once = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if !self.flush_interrupted {
                self.flush_interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            Ok(())
        }
    }
}
