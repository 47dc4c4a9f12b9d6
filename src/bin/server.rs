//! `kindled-server` — a minimal line-echo process entry built on top of
//! the `kindled` networking core.
//!
//! The crate's request-handler contract is deliberately external; this
//! binary supplies the simplest possible implementation (echo each line
//! back, newline-terminated) so the core can be exercised end-to-end.
//! Anything handler-specific (parsing commands, a filter-manager lookup)
//! belongs in a real consumer, not here.

use std::env;
use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use kindled::handler::ConnHandle;
use kindled::{shutdown_networking, start_worker, Config, RequestHandler};

struct EchoHandler;

impl RequestHandler for EchoHandler {
    fn init(&self) {
        log::info!("echo handler ready");
    }

    fn handle_request(&self, handle: &ConnHandle<Self>) -> io::Result<()> {
        loop {
            let line = handle.with_input(|ring| {
                ring.extract_to_terminator(b'\n')
                    .map(|extracted| extracted.as_slice().to_vec())
            });
            let Some(mut line) = line else { break };
            if let Some(terminator) = line.last_mut() {
                *terminator = b'\n';
            }
            handle.send_response(&[&line])?;
        }
        Ok(())
    }
}

fn run() -> Result<(), kindled::NetError> {
    let config_path = env::args().nth(1).unwrap_or_else(|| "kindled.toml".to_string());
    let config = Config::from_file(&config_path)?;
    let worker_threads = config.worker_threads;

    let context = kindled::init_networking(config, EchoHandler)?;
    log::info!("listening with {} worker threads", worker_threads);

    let shutdown_ctx = context.clone();
    ctrlc_shutdown(move || shutdown_networking(&shutdown_ctx));

    let handles: Vec<_> = (0..worker_threads)
        .map(|i| {
            let context = context.clone();
            thread::Builder::new()
                .name(format!("kindled-worker-{i}"))
                .spawn(move || start_worker(&context))
                .expect("failed to spawn worker thread")
        })
        .collect();

    for handle in handles {
        let _ = handle.join();
    }
    Ok(())
}

/// Install `f` as a signal handler invoked once, on `SIGINT`, via a
/// dedicated thread; safe to call from here since [`shutdown_networking`]
/// only touches an atomic flag and posts an async command.
fn ctrlc_shutdown(f: impl Fn() + Send + Sync + 'static) {
    let f: Arc<dyn Fn() + Send + Sync> = Arc::new(f);
    let installed = unsafe {
        libc::signal(
            libc::SIGINT,
            sigint_trampoline as libc::sighandler_t,
        )
    };
    if installed == libc::SIG_ERR {
        log::error!("failed to install SIGINT handler");
        return;
    }
    SHUTDOWN_HOOK
        .set(f)
        .unwrap_or_else(|_| panic!("ctrlc_shutdown installed twice"));
}

static SHUTDOWN_HOOK: std::sync::OnceLock<Arc<dyn Fn() + Send + Sync>> = std::sync::OnceLock::new();

extern "C" fn sigint_trampoline(_signum: libc::c_int) {
    if let Some(hook) = SHUTDOWN_HOOK.get() {
        hook();
    }
}

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
