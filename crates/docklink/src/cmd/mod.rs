use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod dock;
pub mod dump;
pub mod envinfo;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve docking sessions over a Unix-socket test transport.
    Dock(DockArgs),
    /// Decode an NSOF stream from a file and print it.
    Dump(DumpArgs),
    /// Show version information.
    Version(VersionArgs),
    /// Print build and environment diagnostics.
    Envinfo(EnvinfoArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Dock(args) => dock::run(args, format),
        Command::Dump(args) => dump::run(args, format),
        Command::Version(args) => version::run(args),
        Command::Envinfo(args) => envinfo::run(args, format),
    }
}

#[derive(Args, Debug)]
pub struct DockArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Session password; omitted means no password is set.
    #[arg(long)]
    pub password: Option<String>,
    /// Idle timeout in seconds.
    #[arg(long, default_value = "30")]
    pub timeout: u64,
    /// Keepalive interval in seconds; 0 disables it.
    #[arg(long, default_value = "5")]
    pub keepalive: u64,
    /// Exit after one session instead of accepting more.
    #[arg(long)]
    pub once: bool,
}

#[derive(Args, Debug)]
pub struct DumpArgs {
    /// File containing one NSOF stream.
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build details.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug, Default)]
pub struct EnvinfoArgs {}
