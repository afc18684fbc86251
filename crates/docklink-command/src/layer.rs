//! The command layer: one read loop, ordered listener fan-out, and a
//! subscription bus for polling consumers.
//!
//! Listener dispatch is part of the read loop's critical path on purpose: a
//! slow listener delays all subsequent reads, and the handshake's ordering
//! guarantees depend on that strict in-order delivery.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::codec::CommandConfig;
use crate::command::{DesktopCommand, DeviceCommand};
use crate::error::{CommandError, Result};
use crate::reader::CommandReader;
use crate::tag::CommandTag;
use crate::writer::CommandWriter;

/// Receives inbound commands on the read-loop thread.
pub trait CommandListener: Send {
    /// Called for every decoded command, in listener registration order.
    fn on_command(&mut self, command: &DeviceCommand);

    /// Called exactly once when the read loop ends, for any reason.
    fn on_eof(&mut self) {}
}

/// Events published to subscribers.
#[derive(Debug, Clone)]
pub enum LayerEvent {
    /// A command arrived and was dispatched to listeners.
    Received(DeviceCommand),
    /// A command was handed to the transport.
    Sent(CommandTag),
    /// The read loop ended. Final event on every subscription.
    Eof,
}

/// Continue after a poisoned lock; the protected state is plain data and a
/// panicking listener must not wedge teardown.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

struct LayerShared {
    listeners: Mutex<Vec<Box<dyn CommandListener>>>,
    subscribers: Mutex<Vec<SyncSender<LayerEvent>>>,
    stop: AtomicBool,
    eof_delivered: AtomicBool,
}

impl LayerShared {
    fn dispatch(&self, command: &DeviceCommand) {
        let mut listeners = lock(&self.listeners);
        for listener in listeners.iter_mut() {
            listener.on_command(command);
        }
    }

    fn publish(&self, event: LayerEvent) {
        let mut subscribers = lock(&self.subscribers);
        // A full queue blocks here: backpressure for subscribers too.
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn deliver_eof(&self) {
        if self.eof_delivered.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut listeners = lock(&self.listeners);
        for listener in listeners.iter_mut() {
            listener.on_eof();
        }
        drop(listeners);
        self.publish(LayerEvent::Eof);
    }
}

/// Write half of the layer, cheap to clone and hand to listeners.
///
/// Serialization happens on the calling thread; the sent notification is
/// published synchronously on that same thread. There is no write queue —
/// concurrent writers serialize on the writer lock.
#[derive(Clone)]
pub struct CommandSender {
    writer: Arc<Mutex<CommandWriter<Box<dyn Write + Send>>>>,
    shared: Arc<LayerShared>,
}

impl CommandSender {
    /// Serialize a command, hand it to the transport, publish `Sent`.
    pub fn write(&self, command: &DesktopCommand) -> Result<()> {
        if self.shared.stop.load(Ordering::SeqCst) {
            return Err(CommandError::ConnectionClosed);
        }
        lock(&self.writer).write(command)?;
        debug!(tag = %command.tag(), "command sent");
        self.shared.publish(LayerEvent::Sent(command.tag()));
        Ok(())
    }
}

/// Turns a byte transport into a stream of dispatched commands.
pub struct CommandLayer {
    shared: Arc<LayerShared>,
    sender: CommandSender,
    reader: Mutex<Option<Box<dyn Read + Send>>>,
    shutdown_hook: Box<dyn Fn() + Send + Sync>,
    thread: Mutex<Option<JoinHandle<()>>>,
    config: CommandConfig,
}

impl CommandLayer {
    /// Create a layer over split transport halves.
    ///
    /// `shutdown_hook` must interrupt a read blocked on the transport (for a
    /// socket, shut down both directions); it is invoked once from
    /// [`CommandLayer::close`].
    pub fn new(
        reader: Box<dyn Read + Send>,
        writer: Box<dyn Write + Send>,
        shutdown_hook: Box<dyn Fn() + Send + Sync>,
        config: CommandConfig,
    ) -> Self {
        let shared = Arc::new(LayerShared {
            listeners: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
            stop: AtomicBool::new(false),
            eof_delivered: AtomicBool::new(false),
        });
        let sender = CommandSender {
            writer: Arc::new(Mutex::new(CommandWriter::with_config(
                writer,
                config.clone(),
            ))),
            shared: Arc::clone(&shared),
        };
        Self {
            shared,
            sender,
            reader: Mutex::new(Some(reader)),
            shutdown_hook,
            thread: Mutex::new(None),
            config,
        }
    }

    /// Register a listener. Registration order is dispatch order.
    pub fn add_listener(&self, listener: Box<dyn CommandListener>) {
        lock(&self.shared.listeners).push(listener);
    }

    /// Open a bounded event subscription.
    ///
    /// The read loop blocks when the queue is full, so a subscriber that
    /// stops draining stalls the link.
    pub fn subscribe(&self, capacity: usize) -> Receiver<LayerEvent> {
        let (tx, rx) = sync_channel(capacity);
        lock(&self.shared.subscribers).push(tx);
        rx
    }

    /// Start the read loop. A second call is a no-op.
    pub fn start(&self) {
        let Some(reader) = lock(&self.reader).take() else {
            debug!("read loop already started");
            return;
        };
        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        let handle = thread::spawn(move || read_loop(reader, shared, config));
        *lock(&self.thread) = Some(handle);
    }

    /// Write half of this layer.
    pub fn sender(&self) -> CommandSender {
        self.sender.clone()
    }

    /// Serialize and send one command on the caller's thread.
    pub fn write(&self, command: &DesktopCommand) -> Result<()> {
        self.sender.write(command)
    }

    /// Stop the read loop, release the transport, deliver EOF exactly once.
    ///
    /// Idempotent, and safe to call from inside a listener callback.
    pub fn close(&self) {
        if self.shared.stop.swap(true, Ordering::SeqCst) {
            return;
        }
        (self.shutdown_hook)();

        let handle = lock(&self.thread).take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                // Called from the read loop itself; it delivers EOF when it
                // unwinds past the current dispatch.
                return;
            }
            let _ = handle.join();
        }
        self.shared.deliver_eof();
    }

    /// Whether `close` has been requested or the loop has ended.
    pub fn is_closed(&self) -> bool {
        self.shared.stop.load(Ordering::SeqCst) || self.shared.eof_delivered.load(Ordering::SeqCst)
    }
}

impl Drop for CommandLayer {
    fn drop(&mut self) {
        self.close();
    }
}

fn read_loop(reader: Box<dyn Read + Send>, shared: Arc<LayerShared>, config: CommandConfig) {
    let mut reader = CommandReader::with_config(reader, config);
    loop {
        if shared.stop.load(Ordering::SeqCst) {
            break;
        }
        match reader.read_command() {
            Ok(raw) => {
                let tag = raw.tag;
                match DeviceCommand::decode(raw) {
                    Ok(command) => {
                        debug!(%tag, "command received");
                        shared.dispatch(&command);
                        shared.publish(LayerEvent::Received(command));
                    }
                    Err(err) => {
                        warn!(%tag, error = %err, "undecodable command, stopping read loop");
                        break;
                    }
                }
            }
            Err(CommandError::ConnectionClosed) => {
                debug!("transport closed");
                break;
            }
            Err(err) => {
                if !shared.stop.load(Ordering::SeqCst) {
                    warn!(error = %err, "read loop error");
                }
                break;
            }
        }
    }
    shared.deliver_eof();
}

#[cfg(test)]
mod tests {
    use std::os::unix::net::UnixStream;
    use std::sync::mpsc::RecvTimeoutError;
    use std::time::Duration;

    use super::*;
    use crate::codec::RawCommand;
    use crate::tag;
    use crate::writer::CommandWriter;

    fn layer_over(stream: UnixStream) -> CommandLayer {
        let reader = stream.try_clone().unwrap();
        let writer = stream.try_clone().unwrap();
        let hook = move || {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        };
        CommandLayer::new(
            Box::new(reader),
            Box::new(writer),
            Box::new(hook),
            CommandConfig::default(),
        )
    }

    struct Recorder {
        tags: Arc<Mutex<Vec<String>>>,
        eofs: Arc<Mutex<u32>>,
    }

    impl CommandListener for Recorder {
        fn on_command(&mut self, command: &DeviceCommand) {
            lock(&self.tags).push(command.tag().to_string());
        }

        fn on_eof(&mut self) {
            *lock(&self.eofs) += 1;
        }
    }

    #[test]
    fn dispatches_commands_in_order() {
        let (device, desktop) = UnixStream::pair().unwrap();
        let layer = layer_over(desktop);

        let tags = Arc::new(Mutex::new(Vec::new()));
        let eofs = Arc::new(Mutex::new(0));
        layer.add_listener(Box::new(Recorder {
            tags: Arc::clone(&tags),
            eofs: Arc::clone(&eofs),
        }));
        let events = layer.subscribe(16);
        layer.start();

        let mut device_writer = CommandWriter::new(device.try_clone().unwrap());
        device_writer
            .write_raw(&RawCommand::new(
                tag::REQUEST_TO_DOCK,
                9u32.to_be_bytes().to_vec(),
            ))
            .unwrap();
        device_writer
            .write_raw(&RawCommand::new(tag::HELLO, Vec::new()))
            .unwrap();
        drop(device_writer);
        device.shutdown(std::net::Shutdown::Both).unwrap();

        let mut received = Vec::new();
        loop {
            match events.recv_timeout(Duration::from_secs(5)) {
                Ok(LayerEvent::Received(command)) => received.push(command.tag().to_string()),
                Ok(LayerEvent::Eof) => break,
                Ok(_) => {}
                Err(err) => panic!("event stream stalled: {err}"),
            }
        }

        assert_eq!(received, vec!["rtdk", "helo"]);
        assert_eq!(*lock(&tags), vec!["rtdk", "helo"]);
        assert_eq!(*lock(&eofs), 1);
    }

    #[test]
    fn write_publishes_sent_event() {
        let (device, desktop) = UnixStream::pair().unwrap();
        let layer = layer_over(desktop);
        let events = layer.subscribe(4);
        layer.start();

        layer.write(&DesktopCommand::Hello).unwrap();

        match events.recv_timeout(Duration::from_secs(5)).unwrap() {
            LayerEvent::Sent(tag) => assert_eq!(tag, tag::HELLO),
            other => panic!("unexpected event {other:?}"),
        }
        drop(device);
    }

    #[test]
    fn close_is_idempotent_and_delivers_single_eof() {
        let (device, desktop) = UnixStream::pair().unwrap();
        let layer = layer_over(desktop);

        let tags = Arc::new(Mutex::new(Vec::new()));
        let eofs = Arc::new(Mutex::new(0));
        layer.add_listener(Box::new(Recorder {
            tags,
            eofs: Arc::clone(&eofs),
        }));
        layer.start();

        layer.close();
        layer.close();

        assert!(layer.is_closed());
        assert_eq!(*lock(&eofs), 1);
        drop(device);
    }

    #[test]
    fn write_after_close_fails() {
        let (device, desktop) = UnixStream::pair().unwrap();
        let layer = layer_over(desktop);
        layer.start();
        layer.close();

        let err = layer.write(&DesktopCommand::Hello).unwrap_err();
        assert!(matches!(err, CommandError::ConnectionClosed));
        drop(device);
    }

    #[test]
    fn listener_can_reply_from_callback() {
        struct Echo {
            sender: CommandSender,
        }

        impl CommandListener for Echo {
            fn on_command(&mut self, command: &DeviceCommand) {
                if matches!(command, DeviceCommand::Hello) {
                    self.sender.write(&DesktopCommand::Hello).unwrap();
                }
            }
        }

        let (device, desktop) = UnixStream::pair().unwrap();
        let layer = layer_over(desktop);
        layer.add_listener(Box::new(Echo {
            sender: layer.sender(),
        }));
        layer.start();

        let mut device_writer = CommandWriter::new(device.try_clone().unwrap());
        device_writer
            .write_raw(&RawCommand::new(tag::HELLO, Vec::new()))
            .unwrap();

        let mut device_reader = crate::reader::CommandReader::new(device.try_clone().unwrap());
        let reply = device_reader.read_command().unwrap();
        assert_eq!(reply.tag, tag::HELLO);
    }

    #[test]
    fn eof_event_reaches_late_subscriber_before_loop_exit() {
        let (device, desktop) = UnixStream::pair().unwrap();
        let layer = layer_over(desktop);
        let events = layer.subscribe(4);
        layer.start();

        drop(device);

        match events.recv_timeout(Duration::from_secs(5)) {
            Ok(LayerEvent::Eof) => {}
            Ok(other) => panic!("unexpected event {other:?}"),
            Err(RecvTimeoutError::Timeout) => panic!("no EOF within timeout"),
            Err(err) => panic!("event stream broken: {err}"),
        }
    }
}
