use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use scriptwire_channel::{EchoEngine, HostListener};

use crate::cmd::ServeArgs;
use crate::exit::{channel_error, CliError, CliResult, INTERNAL, SUCCESS};

pub fn run(args: ServeArgs) -> CliResult<i32> {
    let listener =
        HostListener::bind(&args.path).map_err(|err| channel_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone(), listener.path().to_path_buf())?;

    let mut sessions = 0u64;
    while running.load(Ordering::SeqCst) {
        let mut host = listener
            .accept(EchoEngine::new())
            .map_err(|err| channel_error("accept failed", err))?;
        if !running.load(Ordering::SeqCst) {
            break;
        }

        sessions += 1;
        match host.serve() {
            Ok(served) => tracing::info!(session = sessions, served, "session ended"),
            Err(err) => tracing::warn!(session = sessions, error = %err, "session failed"),
        }

        if args.count.is_some_and(|count| sessions >= count) {
            break;
        }
    }

    tracing::info!(sessions, "host shutting down");
    Ok(SUCCESS)
}

/// Clear `running` on Ctrl-C and knock on the socket so a blocked accept
/// returns.
fn install_ctrlc_handler(running: Arc<AtomicBool>, wake_path: PathBuf) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
        let _ = UnixStream::connect(&wake_path);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
