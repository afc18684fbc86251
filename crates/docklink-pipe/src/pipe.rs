//! The pipe: a transport-agnostic connection with an explicit lifecycle.

use std::fmt;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use docklink_command::{CommandConfig, CommandLayer, DesktopCommand, LayerEvent};
use tracing::{info, warn};

use crate::context::{lock, LinkContext, TimerHandle};
use crate::docking::{DockingProtocol, HandshakeConfig, HandshakeState, SessionInfo};
use crate::error::{PipeError, Result};
use crate::transport::LinkTransport;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeState {
    Disconnected,
    Listening,
    ConnectPending,
    Connected,
    DisconnectPending,
    Busy,
}

impl PipeState {
    /// States in which reads and writes are legal.
    pub fn can_send(self) -> bool {
        matches!(
            self,
            PipeState::Listening | PipeState::ConnectPending | PipeState::Connected
        )
    }
}

impl fmt::Display for PipeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipeState::Disconnected => "disconnected",
            PipeState::Listening => "listening",
            PipeState::ConnectPending => "connect-pending",
            PipeState::Connected => "connected",
            PipeState::DisconnectPending => "disconnect-pending",
            PipeState::Busy => "busy",
        };
        write!(f, "{name}")
    }
}

/// Keepalive scheduling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveMode {
    /// Send on every interval regardless of traffic.
    FixedInterval,
    /// Skip the send when the peer was heard from within the interval.
    ResetOnActivity,
}

/// Configuration for one pipe.
#[derive(Debug, Clone)]
pub struct PipeConfig {
    /// Command-layer framing limits.
    pub command: CommandConfig,
    /// Handshake behavior.
    pub handshake: HandshakeConfig,
    /// Keepalive interval; `None` disables the periodic hello.
    pub keepalive: Option<Duration>,
    pub keepalive_mode: KeepaliveMode,
    /// Idle window after which a silent peer is disconnected.
    pub idle_timeout: Option<Duration>,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            command: CommandConfig::default(),
            handshake: HandshakeConfig::default(),
            keepalive: None,
            keepalive_mode: KeepaliveMode::FixedInterval,
            idle_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// State shared between the pipe, its handshake listener and its timers.
pub(crate) struct PipeShared {
    state: Mutex<PipeState>,
    layer: Mutex<Option<Arc<CommandLayer>>>,
    timers: Mutex<Vec<TimerHandle>>,
    last_activity: Mutex<Instant>,
    docking_state: Mutex<HandshakeState>,
    session: Mutex<Option<SessionInfo>>,
}

impl PipeShared {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(PipeState::Disconnected),
            layer: Mutex::new(None),
            timers: Mutex::new(Vec::new()),
            last_activity: Mutex::new(Instant::now()),
            docking_state: Mutex::new(HandshakeState::Idle),
            session: Mutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> PipeState {
        *lock(&self.state)
    }

    fn set_state(&self, next: PipeState) {
        *lock(&self.state) = next;
    }

    /// First traffic from the peer is the connect event.
    pub(crate) fn mark_connect_pending(&self) {
        let mut state = lock(&self.state);
        if *state == PipeState::Listening {
            info!("peer connected");
            *state = PipeState::ConnectPending;
        }
    }

    /// Record peer activity for the idle and keepalive timers.
    pub(crate) fn touch(&self) {
        *lock(&self.last_activity) = Instant::now();
    }

    pub(crate) fn idle_for(&self) -> Duration {
        lock(&self.last_activity).elapsed()
    }

    pub(crate) fn docking_state(&self) -> HandshakeState {
        *lock(&self.docking_state)
    }

    pub(crate) fn set_docking_state(&self, next: HandshakeState) {
        *lock(&self.docking_state) = next;
    }

    pub(crate) fn set_session(&self, session: SessionInfo) {
        *lock(&self.session) = Some(session);
    }

    pub(crate) fn session(&self) -> Option<SessionInfo> {
        lock(&self.session).clone()
    }

    pub(crate) fn layer(&self) -> Option<Arc<CommandLayer>> {
        lock(&self.layer).clone()
    }

    pub(crate) fn teardown_quiet(&self) {
        let _ = self.teardown(true);
    }

    /// Cancel timers, close the command layer, settle in `Disconnected`.
    ///
    /// Idempotent; the quiet flag swallows every internal error for
    /// teardown paths where failure must not propagate.
    pub(crate) fn teardown(&self, quiet: bool) -> Result<()> {
        {
            let mut state = lock(&self.state);
            if *state == PipeState::Disconnected {
                return Ok(());
            }
            *state = PipeState::DisconnectPending;
        }
        for timer in lock(&self.timers).drain(..) {
            timer.cancel();
        }
        self.set_docking_state(HandshakeState::Disconnecting);

        let mut first_error = None;
        if let Some(layer) = self.layer() {
            if !layer.is_closed() {
                if let Err(err) = layer.write(&DesktopCommand::Disconnect) {
                    first_error = Some(PipeError::from(err));
                }
            }
            layer.close();
        }

        self.set_docking_state(HandshakeState::Disconnected);
        self.set_state(PipeState::Disconnected);
        info!("pipe disconnected");
        match first_error {
            Some(err) if !quiet => Err(err),
            _ => Ok(()),
        }
    }
}

/// One connection to a device.
///
/// Owns a command layer (created when listening begins) and two timers on
/// the context's shared scheduler. All lifecycle operations are gated on
/// the current [`PipeState`].
pub struct Pipe {
    context: Arc<LinkContext>,
    config: PipeConfig,
    transport: Box<dyn LinkTransport>,
    shared: Arc<PipeShared>,
}

impl Pipe {
    pub fn new(
        context: Arc<LinkContext>,
        transport: Box<dyn LinkTransport>,
        config: PipeConfig,
    ) -> Self {
        Self {
            context,
            config,
            transport,
            shared: Arc::new(PipeShared::new()),
        }
    }

    pub fn state(&self) -> PipeState {
        self.shared.state()
    }

    pub fn handshake_state(&self) -> HandshakeState {
        self.shared.docking_state()
    }

    /// Negotiated session details, available once the handshake completes.
    pub fn session(&self) -> Option<SessionInfo> {
        self.shared.session()
    }

    /// Open the transport, start the read loop and the handshake listener.
    pub fn start_listening(&mut self) -> Result<()> {
        {
            let state = self.shared.state();
            if state != PipeState::Disconnected {
                return Err(PipeError::BadPipeState {
                    operation: "start_listening".to_string(),
                    state: state.to_string(),
                });
            }
        }
        if !self.context.is_started() {
            return Err(PipeError::ContextNotStarted);
        }

        let stream = self.transport.open()?;
        let layer = Arc::new(CommandLayer::new(
            stream.reader,
            stream.writer,
            stream.shutdown,
            self.config.command.clone(),
        ));
        let protocol = DockingProtocol::new(
            self.config.handshake.clone(),
            layer.sender(),
            Arc::clone(&self.shared),
        );
        layer.add_listener(Box::new(protocol));

        *lock(&self.shared.layer) = Some(Arc::clone(&layer));
        self.shared.touch();
        self.shared.set_docking_state(HandshakeState::LinkRequest);
        *lock(&self.shared.session) = None;

        layer.start();
        self.shared.set_state(PipeState::Listening);
        self.start_timers()?;
        info!("pipe listening");
        Ok(())
    }

    /// Accept a peer whose connect event has been observed.
    pub fn accept(&mut self) -> Result<()> {
        let state = self.shared.state();
        if state != PipeState::ConnectPending {
            return Err(PipeError::BadPipeState {
                operation: "accept".to_string(),
                state: state.to_string(),
            });
        }
        self.transport.accept()?;
        self.shared.set_state(PipeState::Connected);
        info!("pipe connected");
        Ok(())
    }

    /// Tear the connection down and release the transport.
    ///
    /// Idempotent from any state; errors from the transport close are
    /// reported.
    pub fn disconnect(&mut self) -> Result<()> {
        let teardown = self.shared.teardown(false);
        let close = self.transport.close();
        teardown?;
        close?;
        Ok(())
    }

    /// Like [`Pipe::disconnect`] but swallows every error. For teardown
    /// paths where failure must not propagate.
    pub fn disconnect_quiet(&mut self) {
        self.shared.teardown_quiet();
        let _ = self.transport.close();
    }

    /// Send one command. Requires a can-send state.
    pub fn write(&self, command: &DesktopCommand) -> Result<()> {
        self.ensure_can_send()?;
        let layer = self.shared.layer().ok_or(PipeError::NotConnected)?;
        layer.write(command)?;
        Ok(())
    }

    /// Open a bounded event subscription on the command layer.
    pub fn subscribe(&self, capacity: usize) -> Result<Receiver<LayerEvent>> {
        let layer = self.shared.layer().ok_or(PipeError::NotConnected)?;
        Ok(layer.subscribe(capacity))
    }

    /// Enter or leave the busy state around a multi-command operation.
    ///
    /// Busy fends off interleaved use of the pipe's own write surface; the
    /// operation in progress drives the command layer directly.
    pub fn set_busy(&self, busy: bool) -> Result<()> {
        let mut state = lock(&self.shared.state);
        match (*state, busy) {
            (PipeState::Connected, true) => {
                *state = PipeState::Busy;
                Ok(())
            }
            (PipeState::Busy, false) => {
                *state = PipeState::Connected;
                Ok(())
            }
            (current, _) => Err(PipeError::BadPipeState {
                operation: "set_busy".to_string(),
                state: current.to_string(),
            }),
        }
    }

    fn ensure_can_send(&self) -> Result<()> {
        if self.shared.state().can_send() {
            Ok(())
        } else {
            Err(PipeError::NotConnected)
        }
    }

    fn start_timers(&self) -> Result<()> {
        let mut timers = Vec::new();

        if let Some(interval) = self.config.keepalive {
            let shared = Arc::clone(&self.shared);
            let mode = self.config.keepalive_mode;
            let handle = self.context.schedule_repeating(
                interval,
                Box::new(move || keepalive_tick(&shared, mode, interval)),
            )?;
            timers.push(handle);
        }

        if let Some(window) = self.config.idle_timeout {
            let shared = Arc::clone(&self.shared);
            let handle = self
                .context
                .schedule_repeating(window, Box::new(move || idle_tick(&shared, window)))?;
            timers.push(handle);
        }

        *lock(&self.shared.timers) = timers;
        Ok(())
    }
}

impl Drop for Pipe {
    fn drop(&mut self) {
        self.disconnect_quiet();
    }
}

fn keepalive_tick(shared: &Arc<PipeShared>, mode: KeepaliveMode, interval: Duration) {
    if shared.docking_state() != HandshakeState::Done {
        return;
    }
    if mode == KeepaliveMode::ResetOnActivity && shared.idle_for() < interval {
        return;
    }
    if let Some(layer) = shared.layer() {
        let _ = layer.write(&DesktopCommand::Hello);
    }
}

fn idle_tick(shared: &Arc<PipeShared>, window: Duration) {
    if shared.state() == PipeState::Disconnected {
        return;
    }
    let idle = shared.idle_for();
    if idle >= window {
        warn!(?idle, "idle timeout, disconnecting");
        shared.teardown_quiet();
    }
}
