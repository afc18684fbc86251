use std::io::IsTerminal;

use clap::ValueEnum;
use docklink_command::{DeviceCommand, LayerEvent};
use docklink_nsof::Value;
use docklink_pipe::SessionInfo;
use serde::Serialize;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Json,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct EventOutput<'a> {
    kind: &'a str,
    tag: String,
    detail: String,
}

pub fn print_event(event: &LayerEvent, format: OutputFormat) {
    let (kind, tag, detail) = match event {
        LayerEvent::Received(command) => {
            ("received", command.tag().to_string(), describe(command))
        }
        LayerEvent::Sent(tag) => ("sent", tag.to_string(), String::new()),
        LayerEvent::Eof => ("eof", String::new(), String::new()),
    };
    match format {
        OutputFormat::Json => {
            let out = EventOutput { kind, tag, detail };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Pretty => {
            if detail.is_empty() {
                println!("{kind} {tag}");
            } else {
                println!("{kind} {tag}: {detail}");
            }
        }
    }
}

#[derive(Serialize)]
struct SessionOutput<'a> {
    device_name: &'a str,
    device_id: u32,
    protocol_version: u32,
    ram_size: u32,
    screen: String,
}

pub fn print_session(session: &SessionInfo, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = SessionOutput {
                device_name: &session.device.name,
                device_id: session.device.device_id,
                protocol_version: session.protocol_version,
                ram_size: session.device.ram_size,
                screen: format!(
                    "{}x{}x{}",
                    session.device.screen_width,
                    session.device.screen_height,
                    session.device.screen_depth
                ),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Pretty => {
            println!(
                "session established with \"{}\" (id {:#x}, protocol {}, {} KiB RAM)",
                session.device.name,
                session.device.device_id,
                session.protocol_version,
                session.device.ram_size / 1024
            );
        }
    }
}

pub fn print_value(value: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&value_to_json(value))
                    .unwrap_or_else(|_| "null".to_string())
            );
        }
        OutputFormat::Pretty => println!("{value}"),
    }
}

/// Lossy projection of an NSOF value onto JSON for tooling output.
fn value_to_json(value: &Value) -> serde_json::Value {
    use serde_json::json;

    match value {
        Value::Nil => serde_json::Value::Null,
        Value::True => serde_json::Value::Bool(true),
        Value::SmallInt(n) => json!(n),
        Value::Character(c) => json!(c.to_string()),
        Value::MagicPointer(m) => json!(format!("@{m}")),
        Value::Binary { class, data } | Value::LargeBinary { class, data } => {
            json!({ "class": class.as_str(), "length": data.len() })
        }
        Value::Array { class, items } => json!({
            "class": class.as_str(),
            "items": items.iter().map(|v| value_to_json(v)).collect::<Vec<_>>(),
        }),
        Value::PlainArray(items) => {
            serde_json::Value::Array(items.iter().map(|v| value_to_json(v)).collect())
        }
        Value::Frame(slots) => serde_json::Value::Object(
            slots
                .iter()
                .map(|(slot, v)| (slot.as_str().to_string(), value_to_json(v)))
                .collect(),
        ),
        Value::String(s) => json!(s),
        Value::Symbol(sym) => json!(format!("'{}", sym.as_str())),
    }
}

fn describe(command: &DeviceCommand) -> String {
    match command {
        DeviceCommand::RequestToDock { protocol_version } => {
            format!("protocol version {protocol_version}")
        }
        DeviceCommand::DeviceName(identity) => format!("\"{}\"", identity.name),
        DeviceCommand::DeviceInfo {
            protocol_version, ..
        } => format!("negotiated version {protocol_version}"),
        DeviceCommand::PasswordReply { .. } => "password reply".to_string(),
        DeviceCommand::ResultCode(code) => format!("result {code}"),
        DeviceCommand::Raw(raw) => format!("{} payload bytes", raw.payload.len()),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_projects_to_json_object() {
        let value = Value::frame([
            ("name", Value::string("Notes")),
            ("count", Value::int(12)),
            ("owner", Value::Nil),
        ]);
        let json = value_to_json(&value);
        assert_eq!(json["name"], "Notes");
        assert_eq!(json["count"], 12);
        assert!(json["owner"].is_null());
    }

    #[test]
    fn binary_projects_to_length_summary() {
        let value = Value::binary("bits", &b"\x01\x02\x03"[..]);
        let json = value_to_json(&value);
        assert_eq!(json["class"], "bits");
        assert_eq!(json["length"], 3);
    }
}
