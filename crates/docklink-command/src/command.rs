//! Typed commands for both directions of the link.
//!
//! One enum per direction with a decode dispatch keyed on the frame tag.
//! Payloads are fixed big-endian fields, except the desktop application
//! list, which rides as one embedded NSOF object.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use docklink_nsof::{decode_from_slice, encode_to_bytes, Value};

use crate::codec::RawCommand;
use crate::error::{CommandError, Result};
use crate::tag::{self, CommandTag};

/// Session type the desktop selects when it accepts a dock request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionType {
    None,
    SettingUp,
    Synchronize,
    Restore,
    LoadPackage,
    TestComm,
    LoadPatch,
    UpdatingStores,
}

impl SessionType {
    pub fn as_u32(self) -> u32 {
        match self {
            SessionType::None => 0,
            SessionType::SettingUp => 1,
            SessionType::Synchronize => 2,
            SessionType::Restore => 3,
            SessionType::LoadPackage => 4,
            SessionType::TestComm => 5,
            SessionType::LoadPatch => 6,
            SessionType::UpdatingStores => 7,
        }
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0 => SessionType::None,
            1 => SessionType::SettingUp,
            2 => SessionType::Synchronize,
            3 => SessionType::Restore,
            4 => SessionType::LoadPackage,
            5 => SessionType::TestComm,
            6 => SessionType::LoadPatch,
            7 => SessionType::UpdatingStores,
            _ => return None,
        })
    }
}

/// Desktop platform advertised in the desktop-info reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesktopType {
    Macintosh,
    Windows,
}

impl DesktopType {
    pub fn as_u32(self) -> u32 {
        match self {
            DesktopType::Macintosh => 0,
            DesktopType::Windows => 1,
        }
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(DesktopType::Macintosh),
            1 => Some(DesktopType::Windows),
            _ => None,
        }
    }
}

/// Feature icons the desktop asks the device to surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IconMask(pub u32);

impl IconMask {
    pub const BACKUP: IconMask = IconMask(1 << 0);
    pub const RESTORE: IconMask = IconMask(1 << 1);
    pub const INSTALL: IconMask = IconMask(1 << 2);
    pub const IMPORT: IconMask = IconMask(1 << 3);
    pub const SYNC: IconMask = IconMask(1 << 4);
    pub const KEYBOARD: IconMask = IconMask(1 << 5);
    pub const ALL: IconMask = IconMask(0x3F);

    pub fn contains(self, other: IconMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for IconMask {
    type Output = IconMask;

    fn bitor(self, rhs: IconMask) -> IconMask {
        IconMask(self.0 | rhs.0)
    }
}

/// One desktop application advertised to the device.
///
/// Rides inside the desktop-info command as an NSOF frame
/// `{name, id, version}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDescriptor {
    pub name: String,
    pub id: i32,
    pub version: i32,
}

impl AppDescriptor {
    pub fn new(name: impl Into<String>, id: i32, version: i32) -> Self {
        Self {
            name: name.into(),
            id,
            version,
        }
    }

    fn to_value(&self) -> Value {
        Value::frame([
            ("id", Value::int(self.id)),
            ("name", Value::string(self.name.clone())),
            ("version", Value::int(self.version)),
        ])
    }

    fn from_value(value: &Value) -> Option<Self> {
        Some(Self {
            name: value.get("name")?.as_str()?.to_string(),
            id: value.get("id")?.as_int()?,
            version: value.get("version")?.as_int()?,
        })
    }
}

/// Identity block the device sends in its `name` command.
///
/// The payload is a length-prefixed block of big-endian words followed by
/// the UTF-16 device name. Serial number and target-protocol words were
/// added by later device generations and are optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub device_id: u32,
    pub manufacturer: u32,
    pub machine_type: u32,
    pub rom_version: u32,
    pub rom_stage: u32,
    pub ram_size: u32,
    pub screen_height: u32,
    pub screen_width: u32,
    pub system_update_version: u32,
    pub object_system_version: u32,
    pub internal_store_signature: u32,
    pub screen_resolution_v: u32,
    pub screen_resolution_h: u32,
    pub screen_depth: u32,
    pub serial_number: Option<[u32; 2]>,
    pub target_protocol: Option<u32>,
    pub name: String,
}

/// Size of the mandatory portion of the identity block.
const IDENTITY_BASE_LEN: usize = 14 * 4;

impl DeviceIdentity {
    pub fn decode(mut payload: Bytes) -> Result<Self> {
        let truncated = || CommandError::TruncatedPayload {
            tag: tag::DEVICE_NAME,
        };

        if payload.remaining() < 4 {
            return Err(truncated());
        }
        let block_len = payload.get_u32() as usize;
        if block_len < IDENTITY_BASE_LEN || payload.remaining() < block_len {
            return Err(truncated());
        }
        let mut block = payload.split_to(block_len);

        let identity = Self {
            device_id: block.get_u32(),
            manufacturer: block.get_u32(),
            machine_type: block.get_u32(),
            rom_version: block.get_u32(),
            rom_stage: block.get_u32(),
            ram_size: block.get_u32(),
            screen_height: block.get_u32(),
            screen_width: block.get_u32(),
            system_update_version: block.get_u32(),
            object_system_version: block.get_u32(),
            internal_store_signature: block.get_u32(),
            screen_resolution_v: block.get_u32(),
            screen_resolution_h: block.get_u32(),
            screen_depth: block.get_u32(),
            serial_number: if block.remaining() >= 8 {
                Some([block.get_u32(), block.get_u32()])
            } else {
                None
            },
            target_protocol: if block.remaining() >= 4 {
                Some(block.get_u32())
            } else {
                None
            },
            name: decode_utf16_name(&payload)?,
        };
        Ok(identity)
    }

    pub fn encode(&self) -> Bytes {
        let mut block_len = IDENTITY_BASE_LEN;
        if self.serial_number.is_some() {
            block_len += 8;
        }
        if self.target_protocol.is_some() {
            block_len += 4;
        }

        let mut dst = BytesMut::new();
        dst.put_u32(block_len as u32);
        dst.put_u32(self.device_id);
        dst.put_u32(self.manufacturer);
        dst.put_u32(self.machine_type);
        dst.put_u32(self.rom_version);
        dst.put_u32(self.rom_stage);
        dst.put_u32(self.ram_size);
        dst.put_u32(self.screen_height);
        dst.put_u32(self.screen_width);
        dst.put_u32(self.system_update_version);
        dst.put_u32(self.object_system_version);
        dst.put_u32(self.internal_store_signature);
        dst.put_u32(self.screen_resolution_v);
        dst.put_u32(self.screen_resolution_h);
        dst.put_u32(self.screen_depth);
        if let Some(serial) = self.serial_number {
            dst.put_u32(serial[0]);
            dst.put_u32(serial[1]);
        }
        if let Some(target) = self.target_protocol {
            dst.put_u32(target);
        }
        for unit in self.name.encode_utf16() {
            dst.put_u16(unit);
        }
        dst.put_u16(0);
        dst.freeze()
    }
}

fn decode_utf16_name(data: &[u8]) -> Result<String> {
    let mut units = Vec::with_capacity(data.len() / 2);
    for pair in data.chunks_exact(2) {
        let unit = u16::from_be_bytes([pair[0], pair[1]]);
        if unit == 0 {
            break;
        }
        units.push(unit);
    }
    String::from_utf16(&units).map_err(|_| docklink_nsof::NsofError::InvalidString.into())
}

/// Commands arriving from the device.
#[derive(Debug, Clone)]
pub enum DeviceCommand {
    RequestToDock { protocol_version: u32 },
    DeviceName(DeviceIdentity),
    DeviceInfo { protocol_version: u32, encrypted_key: u64 },
    PasswordReply { encrypted_key: u64 },
    ResultCode(i32),
    Hello,
    Disconnect,
    OperationCanceled,
    /// A tag outside the engine's registry, passed through to consumers.
    Raw(RawCommand),
}

impl DeviceCommand {
    /// Dispatch a raw frame against the tag registry.
    pub fn decode(raw: RawCommand) -> Result<Self> {
        let tag = raw.tag;
        let mut payload = raw.payload.clone();
        let truncated = || CommandError::TruncatedPayload { tag };

        Ok(match tag {
            tag::REQUEST_TO_DOCK => {
                if payload.remaining() < 4 {
                    return Err(truncated());
                }
                DeviceCommand::RequestToDock {
                    protocol_version: payload.get_u32(),
                }
            }
            tag::DEVICE_NAME => DeviceCommand::DeviceName(DeviceIdentity::decode(payload)?),
            tag::DEVICE_INFO => {
                if payload.remaining() < 12 {
                    return Err(truncated());
                }
                DeviceCommand::DeviceInfo {
                    protocol_version: payload.get_u32(),
                    encrypted_key: payload.get_u64(),
                }
            }
            tag::PASSWORD => {
                if payload.remaining() < 8 {
                    return Err(truncated());
                }
                DeviceCommand::PasswordReply {
                    encrypted_key: payload.get_u64(),
                }
            }
            tag::RESULT => {
                if payload.remaining() < 4 {
                    return Err(truncated());
                }
                DeviceCommand::ResultCode(payload.get_i32())
            }
            tag::HELLO => DeviceCommand::Hello,
            tag::DISCONNECT => DeviceCommand::Disconnect,
            tag::OPERATION_CANCELED => DeviceCommand::OperationCanceled,
            _ => DeviceCommand::Raw(raw),
        })
    }

    pub fn tag(&self) -> CommandTag {
        match self {
            DeviceCommand::RequestToDock { .. } => tag::REQUEST_TO_DOCK,
            DeviceCommand::DeviceName(_) => tag::DEVICE_NAME,
            DeviceCommand::DeviceInfo { .. } => tag::DEVICE_INFO,
            DeviceCommand::PasswordReply { .. } => tag::PASSWORD,
            DeviceCommand::ResultCode(_) => tag::RESULT,
            DeviceCommand::Hello => tag::HELLO,
            DeviceCommand::Disconnect => tag::DISCONNECT,
            DeviceCommand::OperationCanceled => tag::OPERATION_CANCELED,
            DeviceCommand::Raw(raw) => raw.tag,
        }
    }
}

/// Desktop identity payload of the `dinf` reply.
#[derive(Debug, Clone)]
pub struct DesktopInfo {
    pub protocol_version: u32,
    pub desktop_type: DesktopType,
    /// Freshly generated random key the device must cipher back.
    pub challenge: u64,
    pub session: SessionType,
    pub allow_selective_sync: bool,
    pub apps: Vec<AppDescriptor>,
}

/// Commands sent to the device.
#[derive(Debug, Clone)]
pub enum DesktopCommand {
    InitiateDocking { session: SessionType },
    DesktopInfo(DesktopInfo),
    WhichIcons(IconMask),
    SetTimeout { seconds: u32 },
    Password { encrypted_key: u64 },
    ResultCode(i32),
    Hello,
    Disconnect,
}

impl DesktopCommand {
    pub fn tag(&self) -> CommandTag {
        match self {
            DesktopCommand::InitiateDocking { .. } => tag::INITIATE_DOCKING,
            DesktopCommand::DesktopInfo(_) => tag::DESKTOP_INFO,
            DesktopCommand::WhichIcons(_) => tag::WHICH_ICONS,
            DesktopCommand::SetTimeout { .. } => tag::SET_TIMEOUT,
            DesktopCommand::Password { .. } => tag::PASSWORD,
            DesktopCommand::ResultCode(_) => tag::RESULT,
            DesktopCommand::Hello => tag::HELLO,
            DesktopCommand::Disconnect => tag::DISCONNECT,
        }
    }

    /// Serialize to a raw frame.
    pub fn encode(&self) -> Result<RawCommand> {
        let mut payload = BytesMut::new();
        match self {
            DesktopCommand::InitiateDocking { session } => {
                payload.put_u32(session.as_u32());
            }
            DesktopCommand::DesktopInfo(info) => {
                payload.put_u32(info.protocol_version);
                payload.put_u32(info.desktop_type.as_u32());
                payload.put_u64(info.challenge);
                payload.put_u32(info.session.as_u32());
                payload.put_u32(u32::from(info.allow_selective_sync));
                let apps =
                    Value::plain_array(info.apps.iter().map(AppDescriptor::to_value));
                payload.put_slice(&encode_to_bytes(&apps)?);
            }
            DesktopCommand::WhichIcons(mask) => {
                payload.put_u32(mask.0);
            }
            DesktopCommand::SetTimeout { seconds } => {
                payload.put_u32(*seconds);
            }
            DesktopCommand::Password { encrypted_key } => {
                payload.put_u64(*encrypted_key);
            }
            DesktopCommand::ResultCode(code) => {
                payload.put_i32(*code);
            }
            DesktopCommand::Hello | DesktopCommand::Disconnect => {}
        }
        Ok(RawCommand::new(self.tag(), payload.freeze()))
    }

    /// Dispatch a raw frame against the desktop tag registry.
    ///
    /// The engine itself never receives these; this is the decode half used
    /// by loopback tooling and scripted-device tests.
    pub fn decode(raw: RawCommand) -> Result<Self> {
        let mut payload = raw.payload.clone();
        let truncated = || CommandError::TruncatedPayload { tag: raw.tag };

        Ok(match raw.tag {
            tag::INITIATE_DOCKING => {
                if payload.remaining() < 4 {
                    return Err(truncated());
                }
                DesktopCommand::InitiateDocking {
                    session: SessionType::from_u32(payload.get_u32()).ok_or_else(truncated)?,
                }
            }
            tag::DESKTOP_INFO => {
                if payload.remaining() < 24 {
                    return Err(truncated());
                }
                let protocol_version = payload.get_u32();
                let desktop_type =
                    DesktopType::from_u32(payload.get_u32()).ok_or_else(truncated)?;
                let challenge = payload.get_u64();
                let session = SessionType::from_u32(payload.get_u32()).ok_or_else(truncated)?;
                let allow_selective_sync = payload.get_u32() != 0;
                let apps = decode_app_list(&payload)?;
                DesktopCommand::DesktopInfo(DesktopInfo {
                    protocol_version,
                    desktop_type,
                    challenge,
                    session,
                    allow_selective_sync,
                    apps,
                })
            }
            tag::WHICH_ICONS => {
                if payload.remaining() < 4 {
                    return Err(truncated());
                }
                DesktopCommand::WhichIcons(IconMask(payload.get_u32()))
            }
            tag::SET_TIMEOUT => {
                if payload.remaining() < 4 {
                    return Err(truncated());
                }
                DesktopCommand::SetTimeout {
                    seconds: payload.get_u32(),
                }
            }
            tag::PASSWORD => {
                if payload.remaining() < 8 {
                    return Err(truncated());
                }
                DesktopCommand::Password {
                    encrypted_key: payload.get_u64(),
                }
            }
            tag::RESULT => {
                if payload.remaining() < 4 {
                    return Err(truncated());
                }
                DesktopCommand::ResultCode(payload.get_i32())
            }
            tag::HELLO => DesktopCommand::Hello,
            tag::DISCONNECT => DesktopCommand::Disconnect,
            other => return Err(CommandError::InvalidTag(other)),
        })
    }
}

fn decode_app_list(payload: &[u8]) -> Result<Vec<AppDescriptor>> {
    let value = decode_from_slice(payload)?;
    let items = match value.as_ref() {
        Value::PlainArray(items) => items.as_slice(),
        Value::Array { items, .. } => items.as_slice(),
        _ => return Ok(Vec::new()),
    };
    Ok(items
        .iter()
        .filter_map(|item| AppDescriptor::from_value(item))
        .collect())
}
