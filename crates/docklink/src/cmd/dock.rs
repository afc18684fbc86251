use std::os::unix::net::UnixListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::Duration;

use docklink_command::LayerEvent;
use docklink_pipe::{
    Cipher, HandshakeState, KeepaliveMode, LinkContext, Pipe, PipeConfig, PipeState,
    SocketTransport,
};
use tracing::info;

use crate::cmd::DockArgs;
use crate::exit::{io_error, pipe_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_event, print_session, OutputFormat};

pub fn run(args: DockArgs, format: OutputFormat) -> CliResult<i32> {
    let listener = UnixListener::bind(&args.path).map_err(|err| io_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let context = Arc::new(LinkContext::new());
    context.start_up();

    let result = accept_loop(&listener, &context, &args, format, &running);

    context.shut_down();
    let _ = std::fs::remove_file(&args.path);
    result
}

fn accept_loop(
    listener: &UnixListener,
    context: &Arc<LinkContext>,
    args: &DockArgs,
    format: OutputFormat,
    running: &Arc<AtomicBool>,
) -> CliResult<i32> {
    while running.load(Ordering::SeqCst) {
        let (stream, _addr) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(err) => return Err(io_error("accept failed", err)),
        };
        info!("transport connected");

        serve_session(context, stream, args, format, running)?;

        if args.once {
            break;
        }
    }
    Ok(SUCCESS)
}

fn serve_session(
    context: &Arc<LinkContext>,
    stream: std::os::unix::net::UnixStream,
    args: &DockArgs,
    format: OutputFormat,
    running: &Arc<AtomicBool>,
) -> CliResult<()> {
    let mut config = PipeConfig {
        keepalive: (args.keepalive > 0).then(|| Duration::from_secs(args.keepalive)),
        keepalive_mode: KeepaliveMode::ResetOnActivity,
        idle_timeout: Some(Duration::from_secs(args.timeout)),
        ..PipeConfig::default()
    };
    config.handshake.session_timeout = Duration::from_secs(args.timeout);
    if let Some(password) = &args.password {
        config.handshake.cipher = password_cipher(password);
    }

    let mut pipe = Pipe::new(
        Arc::clone(context),
        Box::new(SocketTransport::new(stream)),
        config,
    );
    pipe.start_listening()
        .map_err(|err| pipe_error("listen failed", err))?;
    let events = pipe
        .subscribe(64)
        .map_err(|err| pipe_error("subscribe failed", err))?;

    let mut session_printed = false;
    loop {
        if !running.load(Ordering::SeqCst) {
            pipe.disconnect_quiet();
            return Ok(());
        }
        if pipe.state() == PipeState::ConnectPending {
            pipe.accept().map_err(|err| pipe_error("accept failed", err))?;
        }
        if !session_printed && pipe.handshake_state() == HandshakeState::Done {
            if let Some(session) = pipe.session() {
                print_session(&session, format);
                session_printed = true;
            }
        }
        match events.recv_timeout(Duration::from_millis(200)) {
            Ok(LayerEvent::Eof) => {
                info!("session ended");
                pipe.disconnect_quiet();
                return Ok(());
            }
            Ok(event) => print_event(&event, format),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                pipe.disconnect_quiet();
                return Ok(());
            }
        }
    }
}

/// Fold the session password into a keyed transform of the challenge.
fn password_cipher(password: &str) -> Cipher {
    let mut key = 0u64;
    for byte in password.bytes() {
        key = key.rotate_left(7) ^ u64::from(byte);
    }
    Arc::new(move |challenge| challenge.rotate_left(13) ^ key.wrapping_mul(0x0101_0101_0101_0101))
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
