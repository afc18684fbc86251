//! The docking handshake state machine.
//!
//! One per pipe, created when listening begins and destroyed at disconnect.
//! Every step awaits or sends the one command expected for the current
//! state, then advances; any other inbound command is a protocol violation
//! and tears the connection down. Transitions run synchronously inside the
//! read-loop callback, so no internal locking is needed.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use docklink_command::{
    AppDescriptor, CommandListener, CommandSender, DesktopCommand, DesktopInfo, DesktopType,
    DeviceCommand, DeviceIdentity, IconMask, SessionType,
};
use tracing::{debug, error, info, warn};

use crate::error::{PipeError, Result};
use crate::pipe::PipeShared;

/// Lowest protocol version the desktop will talk to.
pub const MINIMUM_PROTOCOL_VERSION: u32 = 9;

/// Protocol version this desktop implements.
pub const PROTOCOL_VERSION: u32 = 10;

/// Result code asking the device to prompt for the password again.
const RESULT_RETRY_PASSWORD: i32 = -28023;

/// Result code reporting a final password failure.
const RESULT_BAD_PASSWORD: i32 = -28022;

/// Handshake progression, in protocol order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Not listening yet.
    Idle,
    /// Link coming up; waiting for the first traffic from the peer.
    LinkRequest,
    /// Expecting the dock request.
    AwaitRequestToDock,
    /// Replying with the session type.
    InitiateDocking,
    /// Expecting the device identity.
    AwaitDeviceName,
    /// Replying with desktop identity and the challenge key.
    SendDesktopInfo,
    /// Expecting the negotiated version and ciphered challenge.
    AwaitDeviceInfo,
    /// Replying with the icon selection.
    SendWhichIcons,
    /// Expecting the icon acknowledgment.
    AwaitIconsResult,
    /// Replying with the desired idle timeout.
    SendSetTimeout,
    /// Expecting the password verification reply.
    AwaitPasswordReply,
    /// Replying with the desktop's own cipher of the challenge.
    SendPasswordReply,
    /// Steady state; arbitrary commands flow.
    Done,
    Disconnecting,
    Disconnected,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandshakeState::Idle => "idle",
            HandshakeState::LinkRequest => "link-request",
            HandshakeState::AwaitRequestToDock => "await-request-to-dock",
            HandshakeState::InitiateDocking => "initiate-docking",
            HandshakeState::AwaitDeviceName => "await-device-name",
            HandshakeState::SendDesktopInfo => "send-desktop-info",
            HandshakeState::AwaitDeviceInfo => "await-device-info",
            HandshakeState::SendWhichIcons => "send-which-icons",
            HandshakeState::AwaitIconsResult => "await-icons-result",
            HandshakeState::SendSetTimeout => "send-set-timeout",
            HandshakeState::AwaitPasswordReply => "await-password-reply",
            HandshakeState::SendPasswordReply => "send-password-reply",
            HandshakeState::Done => "done",
            HandshakeState::Disconnecting => "disconnecting",
            HandshakeState::Disconnected => "disconnected",
        };
        write!(f, "{name}")
    }
}

/// The password cipher capability supplied by the embedding application.
pub type Cipher = Arc<dyn Fn(u64) -> u64 + Send + Sync>;

/// Configuration for handshake negotiation.
#[derive(Clone)]
pub struct HandshakeConfig {
    /// Version advertised in the desktop-info reply.
    pub protocol_version: u32,
    /// Dock requests below this version are rejected outright.
    pub minimum_protocol_version: u32,
    pub desktop_type: DesktopType,
    /// Session type offered to the device.
    pub session: SessionType,
    pub allow_selective_sync: bool,
    /// Desktop applications advertised to the device.
    pub apps: Vec<AppDescriptor>,
    /// Feature icons to surface on the device; `None` skips the icon step.
    pub icons: Option<IconMask>,
    /// Idle timeout requested from the device.
    pub session_timeout: Duration,
    /// Password mismatches tolerated before the session aborts.
    pub password_retries: u32,
    /// Keyed cipher for the challenge/response exchange.
    pub cipher: Cipher,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            minimum_protocol_version: MINIMUM_PROTOCOL_VERSION,
            desktop_type: DesktopType::Windows,
            session: SessionType::SettingUp,
            allow_selective_sync: false,
            apps: Vec::new(),
            icons: None,
            session_timeout: Duration::from_secs(30),
            password_retries: 3,
            // No password set: the cipher of the challenge is the challenge.
            cipher: Arc::new(|key| key),
        }
    }
}

impl fmt::Debug for HandshakeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeConfig")
            .field("protocol_version", &self.protocol_version)
            .field("minimum_protocol_version", &self.minimum_protocol_version)
            .field("desktop_type", &self.desktop_type)
            .field("session", &self.session)
            .field("allow_selective_sync", &self.allow_selective_sync)
            .field("apps", &self.apps)
            .field("icons", &self.icons)
            .field("session_timeout", &self.session_timeout)
            .field("password_retries", &self.password_retries)
            .field("cipher", &format_args!("<keyed cipher>"))
            .finish()
    }
}

/// Details of an established session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub device: DeviceIdentity,
    /// Version the device settled on in its info reply.
    pub protocol_version: u32,
    /// The device's cipher of the challenge from its info reply.
    pub device_key: u64,
}

/// Drives session establishment over one pipe's command layer.
pub struct DockingProtocol {
    config: HandshakeConfig,
    sender: CommandSender,
    shared: Arc<PipeShared>,
    state: HandshakeState,
    /// Random key the device must cipher back.
    challenge: u64,
    /// The device's cipher of the challenge from its info reply.
    device_key: Option<u64>,
    negotiated_version: Option<u32>,
    identity: Option<DeviceIdentity>,
    password_attempts: u32,
}

impl DockingProtocol {
    pub(crate) fn new(
        config: HandshakeConfig,
        sender: CommandSender,
        shared: Arc<PipeShared>,
    ) -> Self {
        Self {
            config,
            sender,
            shared,
            state: HandshakeState::LinkRequest,
            challenge: rand::random::<u64>(),
            device_key: None,
            negotiated_version: None,
            identity: None,
            password_attempts: 0,
        }
    }

    pub(crate) fn state(&self) -> HandshakeState {
        self.state
    }

    #[cfg(test)]
    pub(crate) fn challenge(&self) -> u64 {
        self.challenge
    }

    fn set_state(&mut self, next: HandshakeState) {
        debug!(from = %self.state, to = %next, "handshake transition");
        self.state = next;
        self.shared.set_docking_state(next);
    }

    /// Process one inbound command for the current state.
    pub(crate) fn handle(&mut self, command: &DeviceCommand) -> Result<()> {
        // Orderly teardown is legal at every step.
        if matches!(command, DeviceCommand::Disconnect) {
            info!("device requested disconnect");
            self.set_state(HandshakeState::Disconnecting);
            self.shared.teardown_quiet();
            return Ok(());
        }

        match (self.state, command) {
            (
                HandshakeState::LinkRequest | HandshakeState::AwaitRequestToDock,
                DeviceCommand::RequestToDock { protocol_version },
            ) => {
                if *protocol_version < self.config.minimum_protocol_version {
                    return Err(PipeError::ProtocolVersion {
                        requested: *protocol_version,
                        minimum: self.config.minimum_protocol_version,
                    });
                }
                info!(version = protocol_version, "dock requested");
                self.set_state(HandshakeState::InitiateDocking);
                self.sender.write(&DesktopCommand::InitiateDocking {
                    session: self.config.session,
                })?;
                self.set_state(HandshakeState::AwaitDeviceName);
                Ok(())
            }

            (HandshakeState::AwaitDeviceName, DeviceCommand::DeviceName(identity)) => {
                info!(name = %identity.name, "device identified");
                self.identity = Some(identity.clone());
                self.set_state(HandshakeState::SendDesktopInfo);
                self.sender
                    .write(&DesktopCommand::DesktopInfo(DesktopInfo {
                        protocol_version: self.config.protocol_version,
                        desktop_type: self.config.desktop_type,
                        challenge: self.challenge,
                        session: self.config.session,
                        allow_selective_sync: self.config.allow_selective_sync,
                        apps: self.config.apps.clone(),
                    }))?;
                self.set_state(HandshakeState::AwaitDeviceInfo);
                Ok(())
            }

            (
                HandshakeState::AwaitDeviceInfo,
                DeviceCommand::DeviceInfo {
                    protocol_version,
                    encrypted_key,
                },
            ) => {
                self.negotiated_version = Some(*protocol_version);
                self.device_key = Some(*encrypted_key);
                if let Some(icons) = self.config.icons {
                    self.set_state(HandshakeState::SendWhichIcons);
                    self.sender.write(&DesktopCommand::WhichIcons(icons))?;
                    self.set_state(HandshakeState::AwaitIconsResult);
                    Ok(())
                } else {
                    self.send_set_timeout()
                }
            }

            (HandshakeState::AwaitIconsResult, DeviceCommand::ResultCode(code)) => {
                if *code != 0 {
                    return Err(PipeError::DeviceError(*code));
                }
                self.send_set_timeout()
            }

            (
                HandshakeState::AwaitPasswordReply,
                DeviceCommand::PasswordReply { encrypted_key },
            ) => {
                let expected = (self.config.cipher)(self.challenge);
                if *encrypted_key == expected {
                    self.set_state(HandshakeState::SendPasswordReply);
                    self.sender.write(&DesktopCommand::Password {
                        encrypted_key: expected,
                    })?;
                    self.finish();
                    Ok(())
                } else {
                    self.password_attempts += 1;
                    if self.password_attempts <= self.config.password_retries {
                        self.sender
                            .write(&DesktopCommand::ResultCode(RESULT_RETRY_PASSWORD))?;
                        Err(PipeError::RetryPassword)
                    } else {
                        self.sender
                            .write(&DesktopCommand::ResultCode(RESULT_BAD_PASSWORD))?;
                        Err(PipeError::BadPassword)
                    }
                }
            }

            // Steady state: keepalives are absorbed, everything else belongs
            // to the session's subscribers.
            (HandshakeState::Done, DeviceCommand::Hello) => Ok(()),
            (HandshakeState::Done, DeviceCommand::OperationCanceled) => {
                debug!("operation canceled by device");
                Ok(())
            }
            (HandshakeState::Done, _) => Ok(()),

            (state, command) => Err(PipeError::BadPipeState {
                operation: format!("command '{}'", command.tag()),
                state: state.to_string(),
            }),
        }
    }

    fn send_set_timeout(&mut self) -> Result<()> {
        self.set_state(HandshakeState::SendSetTimeout);
        self.sender.write(&DesktopCommand::SetTimeout {
            seconds: self.config.session_timeout.as_secs() as u32,
        })?;
        self.set_state(HandshakeState::AwaitPasswordReply);
        Ok(())
    }

    fn finish(&mut self) {
        if let Some(device) = self.identity.clone() {
            self.shared.set_session(SessionInfo {
                device,
                protocol_version: self
                    .negotiated_version
                    .unwrap_or(self.config.protocol_version),
                device_key: self.device_key.unwrap_or_default(),
            });
        }
        self.set_state(HandshakeState::Done);
        info!("handshake complete");
    }
}

impl CommandListener for DockingProtocol {
    fn on_command(&mut self, command: &DeviceCommand) {
        self.shared.touch();
        self.shared.mark_connect_pending();
        if self.state == HandshakeState::LinkRequest {
            self.set_state(HandshakeState::AwaitRequestToDock);
        }
        match self.handle(command) {
            Ok(()) => {}
            Err(PipeError::RetryPassword) => {
                warn!(
                    attempts = self.password_attempts,
                    "password mismatch, awaiting retry"
                );
            }
            Err(err) => {
                error!(error = %err, "handshake failed, tearing down");
                self.set_state(HandshakeState::Disconnecting);
                self.shared.teardown_quiet();
            }
        }
    }

    fn on_eof(&mut self) {
        debug!("link closed");
        self.shared.teardown_quiet();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::net::UnixStream;

    use docklink_command::{CommandConfig, CommandLayer, CommandReader};

    use super::*;

    fn cipher(key: u64) -> u64 {
        key.wrapping_mul(0x9E37_79B9_7F4A_7C15).rotate_left(31)
    }

    fn sample_identity() -> DeviceIdentity {
        DeviceIdentity {
            device_id: 7,
            manufacturer: 0x0100_0000,
            machine_type: 0x1000_0040,
            rom_version: 0x0002_0001,
            rom_stage: 1,
            ram_size: 512 * 1024,
            screen_height: 320,
            screen_width: 240,
            system_update_version: 0,
            object_system_version: 2,
            internal_store_signature: 0x1234_5678,
            screen_resolution_v: 72,
            screen_resolution_h: 72,
            screen_depth: 1,
            serial_number: None,
            target_protocol: None,
            name: "Ada".to_string(),
        }
    }

    struct Harness {
        protocol: DockingProtocol,
        shared: Arc<PipeShared>,
        // Keeps the layer's transport alive while the protocol writes.
        _layer: CommandLayer,
        device: UnixStream,
    }

    fn harness(config: HandshakeConfig) -> Harness {
        let (device, desktop) = UnixStream::pair().unwrap();
        let reader = desktop.try_clone().unwrap();
        let writer = desktop.try_clone().unwrap();
        let hook = move || {
            let _ = desktop.shutdown(std::net::Shutdown::Both);
        };
        let layer = CommandLayer::new(
            Box::new(reader),
            Box::new(writer),
            Box::new(hook),
            CommandConfig::default(),
        );
        let shared = Arc::new(PipeShared::new());
        let protocol = DockingProtocol::new(config, layer.sender(), Arc::clone(&shared));
        Harness {
            protocol,
            shared,
            _layer: layer,
            device,
        }
    }

    fn config_with_cipher() -> HandshakeConfig {
        HandshakeConfig {
            cipher: Arc::new(cipher),
            ..HandshakeConfig::default()
        }
    }

    fn drive_to_password_prompt(h: &mut Harness) {
        h.protocol
            .handle(&DeviceCommand::RequestToDock {
                protocol_version: 10,
            })
            .unwrap();
        h.protocol
            .handle(&DeviceCommand::DeviceName(sample_identity()))
            .unwrap();
        h.protocol
            .handle(&DeviceCommand::DeviceInfo {
                protocol_version: 10,
                encrypted_key: cipher(h.protocol.challenge()),
            })
            .unwrap();
        assert_eq!(h.protocol.state(), HandshakeState::AwaitPasswordReply);
    }

    #[test]
    fn happy_path_reaches_done() {
        let mut h = harness(config_with_cipher());
        drive_to_password_prompt(&mut h);

        let key = cipher(h.protocol.challenge());
        h.protocol
            .handle(&DeviceCommand::PasswordReply { encrypted_key: key })
            .unwrap();
        assert_eq!(h.protocol.state(), HandshakeState::Done);

        let session = h.shared.session().unwrap();
        assert_eq!(session.device.name, "Ada");
        assert_eq!(session.protocol_version, 10);
        assert_eq!(session.device_key, cipher(h.protocol.challenge()));

        // The reply stream is dock, dinf, stim, pass.
        let mut reader = CommandReader::new(h.device.try_clone().unwrap());
        let tags: Vec<String> = (0..4)
            .map(|_| reader.read_command().unwrap().tag.to_string())
            .collect();
        assert_eq!(tags, vec!["dock", "dinf", "stim", "pass"]);
    }

    #[test]
    fn icon_step_runs_when_configured() {
        let config = HandshakeConfig {
            icons: Some(IconMask::BACKUP | IconMask::INSTALL),
            ..config_with_cipher()
        };
        let mut h = harness(config);

        h.protocol
            .handle(&DeviceCommand::RequestToDock {
                protocol_version: 9,
            })
            .unwrap();
        h.protocol
            .handle(&DeviceCommand::DeviceName(sample_identity()))
            .unwrap();
        h.protocol
            .handle(&DeviceCommand::DeviceInfo {
                protocol_version: 9,
                encrypted_key: 0,
            })
            .unwrap();
        assert_eq!(h.protocol.state(), HandshakeState::AwaitIconsResult);

        h.protocol.handle(&DeviceCommand::ResultCode(0)).unwrap();
        assert_eq!(h.protocol.state(), HandshakeState::AwaitPasswordReply);
    }

    #[test]
    fn icon_step_error_code_aborts() {
        let config = HandshakeConfig {
            icons: Some(IconMask::ALL),
            ..config_with_cipher()
        };
        let mut h = harness(config);

        h.protocol
            .handle(&DeviceCommand::RequestToDock {
                protocol_version: 10,
            })
            .unwrap();
        h.protocol
            .handle(&DeviceCommand::DeviceName(sample_identity()))
            .unwrap();
        h.protocol
            .handle(&DeviceCommand::DeviceInfo {
                protocol_version: 10,
                encrypted_key: 0,
            })
            .unwrap();

        let err = h.protocol.handle(&DeviceCommand::ResultCode(-1)).unwrap_err();
        assert!(matches!(err, PipeError::DeviceError(-1)));
    }

    #[test]
    fn version_below_floor_rejected_without_transition() {
        let mut h = harness(config_with_cipher());

        let err = h
            .protocol
            .handle(&DeviceCommand::RequestToDock { protocol_version: 8 })
            .unwrap_err();
        assert!(matches!(
            err,
            PipeError::ProtocolVersion {
                requested: 8,
                minimum: 9
            }
        ));
        assert_eq!(h.protocol.state(), HandshakeState::LinkRequest);
    }

    #[test]
    fn wrong_password_blocks_advancement() {
        let config = HandshakeConfig {
            password_retries: 1,
            ..config_with_cipher()
        };
        let mut h = harness(config);
        drive_to_password_prompt(&mut h);

        let wrong = cipher(h.protocol.challenge()) ^ 1;
        let err = h
            .protocol
            .handle(&DeviceCommand::PasswordReply {
                encrypted_key: wrong,
            })
            .unwrap_err();
        assert!(matches!(err, PipeError::RetryPassword));
        assert_eq!(h.protocol.state(), HandshakeState::AwaitPasswordReply);

        let err = h
            .protocol
            .handle(&DeviceCommand::PasswordReply {
                encrypted_key: wrong,
            })
            .unwrap_err();
        assert!(matches!(err, PipeError::BadPassword));
        assert_eq!(h.protocol.state(), HandshakeState::AwaitPasswordReply);

        // The correct key still completes the handshake afterwards; aborting
        // the session on exhausted retries is the caller's decision.
        let key = cipher(h.protocol.challenge());
        h.protocol
            .handle(&DeviceCommand::PasswordReply { encrypted_key: key })
            .unwrap();
        assert_eq!(h.protocol.state(), HandshakeState::Done);
    }

    #[test]
    fn unexpected_command_is_protocol_violation() {
        let mut h = harness(config_with_cipher());

        let err = h.protocol.handle(&DeviceCommand::Hello).unwrap_err();
        assert!(matches!(err, PipeError::BadPipeState { .. }));
    }

    #[test]
    fn out_of_order_command_is_protocol_violation() {
        let mut h = harness(config_with_cipher());
        h.protocol
            .handle(&DeviceCommand::RequestToDock {
                protocol_version: 10,
            })
            .unwrap();

        // A password reply while the device name is expected.
        let err = h
            .protocol
            .handle(&DeviceCommand::PasswordReply { encrypted_key: 0 })
            .unwrap_err();
        assert!(matches!(err, PipeError::BadPipeState { .. }));
    }

    #[test]
    fn disconnect_is_legal_mid_handshake() {
        let mut h = harness(config_with_cipher());
        h.protocol
            .handle(&DeviceCommand::RequestToDock {
                protocol_version: 10,
            })
            .unwrap();

        h.protocol.handle(&DeviceCommand::Disconnect).unwrap();
        assert_eq!(h.shared.docking_state(), HandshakeState::Disconnected);
    }

    #[test]
    fn steady_state_absorbs_keepalive_and_passthrough() {
        let mut h = harness(config_with_cipher());
        drive_to_password_prompt(&mut h);
        let key = cipher(h.protocol.challenge());
        h.protocol
            .handle(&DeviceCommand::PasswordReply { encrypted_key: key })
            .unwrap();

        h.protocol.handle(&DeviceCommand::Hello).unwrap();
        h.protocol
            .handle(&DeviceCommand::OperationCanceled)
            .unwrap();
        assert_eq!(h.protocol.state(), HandshakeState::Done);
    }

    #[test]
    fn config_debug_redacts_cipher() {
        let config = config_with_cipher();
        let rendered = format!("{config:?}");
        assert!(rendered.contains("<keyed cipher>"));
    }
}
