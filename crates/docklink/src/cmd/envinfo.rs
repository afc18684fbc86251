use serde::Serialize;

use crate::cmd::EnvinfoArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::OutputFormat;

#[derive(Serialize)]
struct EnvInfo {
    version: &'static str,
    os: &'static str,
    arch: &'static str,
    protocol_version: u32,
    minimum_peer_version: u32,
}

pub fn run(_args: EnvinfoArgs, format: OutputFormat) -> CliResult<i32> {
    let info = EnvInfo {
        version: env!("CARGO_PKG_VERSION"),
        os: std::env::consts::OS,
        arch: std::env::consts::ARCH,
        protocol_version: docklink_pipe::PROTOCOL_VERSION,
        minimum_peer_version: docklink_pipe::MINIMUM_PROTOCOL_VERSION,
    };
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string(&info).unwrap_or_else(|_| "{}".to_string())
        ),
        OutputFormat::Pretty => {
            println!("docklink {}", info.version);
            println!("platform {}/{}", info.os, info.arch);
            println!(
                "protocol {} (minimum peer {})",
                info.protocol_version, info.minimum_peer_version
            );
        }
    }
    Ok(SUCCESS)
}
