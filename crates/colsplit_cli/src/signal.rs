//! Interrupt handling: the first SIGINT/SIGTERM cancels the split job.

use std::future::Future;
use std::io;
use std::thread;

use anyhow::Context;
use colsplit_split::SplitCancelToken;
use tracing::{info, warn};

/// Name of the signal listener thread.
pub const C_THREAD_NAME_SIGNAL: &str = "colsplit-signal";
/// Exit status after a second interrupt (128 + SIGINT).
const N_EXIT_CODE_ABORTED: i32 = 130;

#[cfg(unix)]
struct SignalListener {
    sigint: tokio::signal::unix::Signal,
    sigterm: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl SignalListener {
    /// Must be called inside a tokio runtime context.
    fn new() -> io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigint.recv() => "SIGINT",
            _ = self.sigterm.recv() => "SIGTERM",
        }
    }
}

#[cfg(not(unix))]
struct SignalListener;

#[cfg(not(unix))]
impl SignalListener {
    fn new() -> io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> &'static str {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("ctrl-c listener failed: {err}");
        }
        "ctrl-c"
    }
}

/// Wait for `signal`, then request cancellation through `token`.
async fn cancel_on_signal<F>(signal: F, token: &SplitCancelToken)
where
    F: Future<Output = &'static str>,
{
    let c_signal = signal.await;
    info!(message = "Signal received.", signal = c_signal);
    warn!("cancelling after the file in progress; interrupt again to abort");
    token.cancel();
}

/// Install SIGINT/SIGTERM handlers that cancel `token`.
///
/// The first signal requests cooperative cancellation, so the job ends with
/// `Finished(cancelled)`. A second signal exits the process at once.
pub fn spawn_interrupt_listener(token: SplitCancelToken) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build signal runtime")?;
    let mut listener = {
        let _guard = runtime.enter();
        SignalListener::new().context("Failed to install signal handlers")?
    };

    thread::Builder::new()
        .name(C_THREAD_NAME_SIGNAL.to_string())
        .spawn(move || {
            runtime.block_on(async move {
                cancel_on_signal(listener.recv(), &token).await;
                let c_signal = listener.recv().await;
                warn!(signal = c_signal, "second interrupt; aborting");
                std::process::exit(N_EXIT_CODE_ABORTED);
            });
        })
        .context("Failed to spawn signal listener thread")?;
    Ok(())
}
