//! Shutdown coordination
//!
//! Every way the process can end (a signal, the sandbox asking to close, a
//! fatal error) funnels into [`ShutdownCoordinator`].
//! The first trigger wins a compare-and-set and runs the registered teardown
//! steps in stage order; later triggers are no-ops.

use crate::utils::logging::render_error;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Host-side closing state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShutdownState {
    Running = 0,
    ShuttingDown = 1,
    Stopped = 2,
}

impl ShutdownState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ShutdownState::Running,
            1 => ShutdownState::ShuttingDown,
            _ => ShutdownState::Stopped,
        }
    }
}

/// What started the shutdown
#[derive(Debug)]
pub enum ShutdownCause {
    /// An OS signal, by name
    Signal(&'static str),
    /// The sandbox called `closeBrowser`, e.g. because the call ended
    SandboxClose,
    /// Unrecoverable host error
    Fatal(anyhow::Error),
}

impl ShutdownCause {
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownCause::Fatal(_) => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownCause::Signal(name) => write!(f, "{name}"),
            ShutdownCause::SandboxClose => write!(f, "sandbox requested close"),
            ShutdownCause::Fatal(e) => write!(f, "fatal error: {e}"),
        }
    }
}

/// Teardown stages, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TeardownStage {
    HttpServer,
    SandboxTeardown,
    SandboxContext,
}

/// One piece of teardown
#[async_trait]
pub trait TeardownStep: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self) -> anyhow::Result<()>;
}

type ExitHook = Box<dyn Fn(i32) + Send + Sync>;

pub struct ShutdownCoordinator {
    state: AtomicU8,
    steps: Mutex<Vec<(TeardownStage, Arc<dyn TeardownStep>)>>,
    exit: ExitHook,
    exit_code: watch::Sender<Option<i32>>,
}

impl ShutdownCoordinator {
    /// Coordinator that calls `exit` with the exit code once teardown is done
    pub fn new(exit: impl Fn(i32) + Send + Sync + 'static) -> Arc<Self> {
        let (exit_code, _) = watch::channel(None);
        Arc::new(Self {
            state: AtomicU8::new(ShutdownState::Running as u8),
            steps: Mutex::new(Vec::new()),
            exit: Box::new(exit),
            exit_code,
        })
    }

    pub fn state(&self) -> ShutdownState {
        ShutdownState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    /// Add a teardown step. Steps registered after shutdown began never run.
    pub fn register(&self, stage: TeardownStage, step: Arc<dyn TeardownStep>) {
        if !self.is_running() {
            tracing::warn!("{} registered after shutdown began, skipping", step.name());
            return;
        }
        self.steps.lock().push((stage, step));
    }

    /// Start shutting down in the background.
    ///
    /// Returns `true` if this call started the teardown.
    pub fn trigger(self: &Arc<Self>, cause: ShutdownCause) -> bool {
        if !self.begin(&cause) {
            return false;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let this = self.clone();
                runtime.spawn(async move { this.teardown(cause).await });
            }
            Err(_) => {
                tracing::error!("No runtime to shut down on ({}), exiting", cause);
                self.finish(cause.exit_code());
            }
        }
        true
    }

    /// Shut down on the current task and wait until teardown has finished.
    ///
    /// Returns `true` if this call ran the teardown.
    pub async fn shutdown(&self, cause: ShutdownCause) -> bool {
        if self.begin(&cause) {
            self.teardown(cause).await;
            true
        } else {
            self.stopped().await;
            false
        }
    }

    /// Resolves with the exit code once teardown has finished
    pub async fn stopped(&self) -> i32 {
        let mut rx = self.exit_code.subscribe();
        let code = match rx.wait_for(Option::is_some).await {
            Ok(code) => (*code).unwrap_or(1),
            Err(_) => 1,
        };
        code
    }

    fn begin(&self, cause: &ShutdownCause) -> bool {
        let won = self
            .state
            .compare_exchange(
                ShutdownState::Running as u8,
                ShutdownState::ShuttingDown as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if !won {
            tracing::debug!("Already shutting down, ignoring {}", cause);
        }
        won
    }

    async fn teardown(&self, cause: ShutdownCause) {
        match &cause {
            ShutdownCause::Fatal(e) => tracing::error!("Shutting down:{}", render_error(e)),
            other => tracing::info!("Shutting down ({})...", other),
        }

        let mut steps = std::mem::take(&mut *self.steps.lock());
        steps.sort_by_key(|(stage, _)| *stage);
        for (stage, step) in steps {
            tracing::debug!("Teardown stage {:?}: {}", stage, step.name());
            if let Err(e) = step.run().await {
                tracing::error!(
                    "{} failed:{}",
                    step.name(),
                    render_error(&e.context(format!("teardown stage {stage:?}")))
                );
            }
        }

        self.finish(cause.exit_code());
    }

    fn finish(&self, code: i32) {
        self.state
            .store(ShutdownState::Stopped as u8, Ordering::SeqCst);
        tracing::info!("Exiting with code {}.", code);
        self.exit_code.send_replace(Some(code));
        (self.exit)(code);
    }
}
