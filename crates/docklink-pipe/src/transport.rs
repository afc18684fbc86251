//! The transport seam below the command layer.
//!
//! A transport hands over split read/write halves of a byte stream that
//! delivers whole, reliably-ordered command frames — a link layer with its
//! own framing and retransmission, or a stream socket standing in for one.

use std::io::{ErrorKind, Read, Write};

/// Split halves of an open byte transport.
pub struct TransportStream {
    pub reader: Box<dyn Read + Send>,
    pub writer: Box<dyn Write + Send>,
    /// Interrupts a read blocked on the transport; invoked once at teardown.
    pub shutdown: Box<dyn Fn() + Send + Sync>,
}

/// A connection-oriented byte transport.
pub trait LinkTransport: Send {
    /// Open the transport and hand back split stream halves.
    fn open(&mut self) -> std::io::Result<TransportStream>;

    /// Transport-specific acceptance of a pending peer.
    fn accept(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    /// Release transport resources beyond the stream itself.
    fn close(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Transport over an already-connected stream socket.
///
/// Stands in for the serial link layer in tests and local tooling.
#[cfg(unix)]
pub struct SocketTransport {
    stream: Option<std::os::unix::net::UnixStream>,
}

#[cfg(unix)]
impl SocketTransport {
    pub fn new(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            stream: Some(stream),
        }
    }
}

#[cfg(unix)]
impl LinkTransport for SocketTransport {
    fn open(&mut self) -> std::io::Result<TransportStream> {
        let stream = self.stream.take().ok_or_else(|| {
            std::io::Error::new(ErrorKind::NotConnected, "transport already opened")
        })?;
        let reader = stream.try_clone()?;
        let writer = stream.try_clone()?;
        Ok(TransportStream {
            reader: Box::new(reader),
            writer: Box::new(writer),
            shutdown: Box::new(move || {
                let _ = stream.shutdown(std::net::Shutdown::Both);
            }),
        })
    }
}
