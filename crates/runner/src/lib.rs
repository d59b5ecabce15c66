//! Process runner for the ingester: runs long-lived processes until a
//! shutdown signal or a failure, then runs closers and reports an exit code.
//!
//! - Processes run concurrently on their own tasks
//! - SIGINT and SIGTERM cancel every process through a shared token
//! - Closers always run afterwards, bounded by a timeout
//! - The outcome maps to exit code 0 (clean stop) or 1 (a process failed)
//!
//! # Example
//!
//! ```no_run
//! use ingester_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let code = Runner::new()
//!         .with_app_process(|ctx| async move {
//!             ctx.cancelled().await;
//!             Ok(())
//!         })
//!         .with_closer(|| async move {
//!             tracing::info!("flushing telemetry");
//!             Ok(())
//!         })
//!         .with_closer_timeout(Duration::from_secs(5))
//!         .run()
//!         .await;
//!
//!     std::process::exit(code.code());
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// A long-running process. Receives the shared cancellation token.
pub type AppProcess = Box<
    dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>>
        + Send,
>;

/// Cleanup run once every process has stopped
pub type Closer =
    Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>> + Send>;

/// How the runner finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Stopped by signal or cancellation, or every process returned Ok
    Clean,
    /// At least one process returned an error or panicked
    ProcessFailed,
}

impl RunOutcome {
    pub fn code(&self) -> i32 {
        match self {
            Self::Clean => 0,
            Self::ProcessFailed => 1,
        }
    }
}

pub struct Runner {
    app_processes: Vec<AppProcess>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
    handle_signals: bool,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Closer timeout defaults to 10 seconds; signal handling is on.
    pub fn new() -> Self {
        Self {
            app_processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
            handle_signals: true,
        }
    }

    /// Add a process. If any process fails, all others are cancelled.
    pub fn with_app_process<F, Fut>(mut self, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.app_processes
            .push(Box::new(|token| Box::pin(process(token))));
        self
    }

    /// Add a closer. Closers run concurrently after the processes stop,
    /// whatever the reason; a failing closer does not stop the others.
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Use an externally owned token, e.g. to stop the runner from a test
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Disable the SIGINT/SIGTERM handlers
    pub fn without_signal_handlers(mut self) -> Self {
        self.handle_signals = false;
        self
    }

    /// Run every process until cancellation or failure, then the closers
    pub async fn run(self) -> RunOutcome {
        let token = self.cancellation_token;
        let closer_timeout = self.closer_timeout;
        let closers = self.closers;
        let mut join_set = JoinSet::new();

        for process in self.app_processes {
            let process_token = token.clone();
            join_set.spawn(async move { process(process_token).await });
        }

        if self.handle_signals {
            spawn_signal_handlers(token.clone());
        }

        let mut failed = false;
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok(Ok(())) => {
                    tracing::debug!("app process completed");
                }
                Ok(Err(err)) => {
                    tracing::error!(error = %format!("{:#}", err), "app process failed");
                    failed = true;
                }
                Err(err) => {
                    tracing::error!(error = %err, "app process panicked");
                    failed = true;
                }
            }

            // One process stopping stops them all
            if !token.is_cancelled() {
                token.cancel();
            }
        }

        if !closers.is_empty() {
            tracing::info!(
                timeout_ms = closer_timeout.as_millis() as u64,
                "running closers"
            );
            match tokio::time::timeout(closer_timeout, run_closers(closers)).await {
                Ok(()) => tracing::info!("all closers completed"),
                Err(_) => tracing::error!(
                    timeout_ms = closer_timeout.as_millis() as u64,
                    "closers timed out"
                ),
            }
        }

        if failed {
            tracing::error!("ingester exiting with error");
            RunOutcome::ProcessFailed
        } else {
            tracing::info!("ingester exiting normally");
            RunOutcome::Clean
        }
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!(signal = "SIGINT", "received shutdown signal");
                ctrl_c_token.cancel();
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGINT handler");
            }
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!(signal = "SIGTERM", "received shutdown signal");
                token.cancel();
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
            }
        }
    });
}

async fn run_closers(closers: Vec<Closer>) {
    let mut closer_set = JoinSet::new();
    for closer in closers {
        closer_set.spawn(async move { closer().await });
    }

    while let Some(result) = closer_set.join_next().await {
        match result {
            Ok(Ok(())) => tracing::debug!("closer completed"),
            Ok(Err(err)) => tracing::error!(error = %format!("{:#}", err), "closer failed"),
            Err(err) => tracing::error!(error = %err, "closer panicked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn test_runner(token: &CancellationToken) -> Runner {
        Runner::new()
            .without_signal_handlers()
            .with_cancellation_token(token.clone())
    }

    #[test]
    fn test_outcome_exit_codes() {
        assert_eq!(RunOutcome::Clean.code(), 0);
        assert_eq!(RunOutcome::ProcessFailed.code(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_exits_clean_and_runs_closers() {
        let closer_called = Arc::new(AtomicBool::new(false));
        let closer_flag = Arc::clone(&closer_called);
        let token = CancellationToken::new();

        let runner = test_runner(&token)
            .with_app_process(|ctx| async move {
                ctx.cancelled().await;
                Ok(())
            })
            .with_closer(move || async move {
                closer_flag.store(true, Ordering::SeqCst);
                Ok(())
            });

        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        assert_eq!(runner.run().await, RunOutcome::Clean);
        assert!(closer_called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_process_error_cancels_others_and_fails() {
        let sibling_stopped = Arc::new(AtomicBool::new(false));
        let sibling_flag = Arc::clone(&sibling_stopped);
        let closer_calls = Arc::new(AtomicUsize::new(0));
        let closer_count = Arc::clone(&closer_calls);
        let token = CancellationToken::new();

        let outcome = test_runner(&token)
            .with_app_process(|_ctx| async move { Err(anyhow::anyhow!("broker gone")) })
            .with_app_process(move |ctx| async move {
                ctx.cancelled().await;
                sibling_flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .with_closer(move || async move {
                closer_count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .run()
            .await;

        assert_eq!(outcome, RunOutcome::ProcessFailed);
        assert_eq!(outcome.code(), 1);
        assert!(sibling_stopped.load(Ordering::SeqCst));
        assert_eq!(closer_calls.load(Ordering::SeqCst), 1);
    }

    async fn panicking_process(_ctx: CancellationToken) -> anyhow::Result<()> {
        panic!("boom")
    }

    #[tokio::test]
    async fn test_process_panic_fails() {
        let token = CancellationToken::new();

        let outcome = test_runner(&token)
            .with_app_process(panicking_process)
            .run()
            .await;

        assert_eq!(outcome, RunOutcome::ProcessFailed);
    }

    #[tokio::test]
    async fn test_failing_closer_does_not_block_others() {
        let second_called = Arc::new(AtomicBool::new(false));
        let second_flag = Arc::clone(&second_called);
        let token = CancellationToken::new();
        token.cancel();

        let outcome = test_runner(&token)
            .with_closer(|| async move { Err(anyhow::anyhow!("flush failed")) })
            .with_closer(move || async move {
                second_flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .run()
            .await;

        assert_eq!(outcome, RunOutcome::Clean);
        assert!(second_called.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closer_timeout_is_bounded() {
        let token = CancellationToken::new();
        token.cancel();

        let outcome = test_runner(&token)
            .with_closer(|| async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .with_closer_timeout(Duration::from_secs(1))
            .run()
            .await;

        assert_eq!(outcome, RunOutcome::Clean);
    }
}
