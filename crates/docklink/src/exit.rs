use std::fmt;
use std::io;

use docklink_command::CommandError;
use docklink_nsof::NsofError;
use docklink_pipe::PipeError;

// Exit code constants shared across subcommands.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const PROTOCOL_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn nsof_error(context: &str, err: NsofError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn command_error(context: &str, err: CommandError) -> CliError {
    match err {
        CommandError::Io(source) => io_error(context, source),
        CommandError::Nsof(err) => nsof_error(context, err),
        CommandError::PayloadTooLarge { .. }
        | CommandError::InvalidTag(_)
        | CommandError::InvalidLength(_)
        | CommandError::TruncatedPayload { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        CommandError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn pipe_error(context: &str, err: PipeError) -> CliError {
    match err {
        PipeError::Io(source) => io_error(context, source),
        PipeError::Command(err) => command_error(context, err),
        PipeError::Nsof(err) => nsof_error(context, err),
        PipeError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        PipeError::ProtocolVersion { .. }
        | PipeError::BadPassword
        | PipeError::RetryPassword
        | PipeError::DeviceError(_) => CliError::new(PROTOCOL_ERROR, format!("{context}: {err}")),
        PipeError::BadPipeState { .. } | PipeError::ContextNotStarted => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}
