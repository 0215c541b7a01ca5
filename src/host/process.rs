//! Sandbox lifecycle
//!
//! The host starts the sandbox through a [`SandboxLauncher`] and gets back the
//! two ends of the bridge plus the teardown step that disposes of the sandbox
//! context. In production that context is a child process; the in-process
//! launcher runs the page runtime on a task instead.

use super::shutdown::TeardownStep;
use crate::sandbox::{self, SandboxEnv};
use crate::utils::error::{AppError, AppResult};
use anyhow::Context;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

/// A freshly started sandbox
pub struct SandboxHandle {
    /// Messages from the sandbox
    pub reader: Box<dyn AsyncBufRead + Unpin + Send>,
    /// Requests to the sandbox
    pub writer: Box<dyn AsyncWrite + Unpin + Send>,
    /// Disposes of the sandbox context
    pub context: Arc<dyn TeardownStep>,
}

#[async_trait]
pub trait SandboxLauncher: Send + Sync {
    async fn launch(&self) -> AppResult<SandboxHandle>;
}

/// Runs the sandbox as a child process speaking the bridge on stdin/stdout
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessLauncher {
    /// `program sandbox <args...>`
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// The running executable's own `sandbox` subcommand
    pub fn current_exe(args: Vec<String>) -> AppResult<Self> {
        Ok(Self::new(std::env::current_exe()?, args))
    }
}

#[async_trait]
impl SandboxLauncher for ProcessLauncher {
    async fn launch(&self) -> AppResult<SandboxHandle> {
        let mut command = Command::new(&self.program);
        command
            .arg("sandbox")
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            AppError::Sandbox(format!("failed to launch {}: {e}", self.program.display()))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::Sandbox("sandbox has no stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Sandbox("sandbox has no stdout".to_string()))?;
        tracing::debug!("Sandbox process {:?} started", child.id());

        Ok(SandboxHandle {
            reader: Box::new(BufReader::new(stdout)),
            writer: Box::new(stdin),
            context: Arc::new(SandboxProcess {
                child: tokio::sync::Mutex::new(child),
            }),
        })
    }
}

/// Teardown of the sandbox child process
struct SandboxProcess {
    child: tokio::sync::Mutex<Child>,
}

#[async_trait]
impl TeardownStep for SandboxProcess {
    fn name(&self) -> &'static str {
        "sandbox process"
    }

    async fn run(&self) -> anyhow::Result<()> {
        tracing::debug!("Closing sandbox...");
        let mut child = self.child.lock().await;
        match child.try_wait().context("checking sandbox process")? {
            Some(status) => tracing::debug!("Sandbox already exited ({})", status),
            None => child.kill().await.context("killing sandbox process")?,
        }
        tracing::info!("Closed sandbox.");
        Ok(())
    }
}

/// Runs the page runtime on a task in this process, over an in-memory pipe
#[derive(Clone)]
pub struct InProcessLauncher {
    env: SandboxEnv,
    buffer_size: usize,
}

impl InProcessLauncher {
    pub fn new(env: SandboxEnv) -> Self {
        Self {
            env,
            buffer_size: 64 * 1024,
        }
    }
}

#[async_trait]
impl SandboxLauncher for InProcessLauncher {
    async fn launch(&self) -> AppResult<SandboxHandle> {
        let (host_io, sandbox_io) = tokio::io::duplex(self.buffer_size);
        let (sandbox_read, sandbox_write) = tokio::io::split(sandbox_io);
        let env = self.env.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = sandbox::serve(BufReader::new(sandbox_read), sandbox_write, env).await {
                tracing::error!("Sandbox task failed: {}", e);
            }
        });

        let (host_read, host_write) = tokio::io::split(host_io);
        Ok(SandboxHandle {
            reader: Box::new(BufReader::new(host_read)),
            writer: Box::new(host_write),
            context: Arc::new(SandboxTask {
                task: Mutex::new(Some(task)),
            }),
        })
    }
}

/// Teardown of an in-process sandbox
struct SandboxTask {
    task: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl TeardownStep for SandboxTask {
    fn name(&self) -> &'static str {
        "sandbox task"
    }

    async fn run(&self) -> anyhow::Result<()> {
        tracing::debug!("Closing sandbox...");
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.abort();
            // Either aborted or already finished
            let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
        }
        tracing::info!("Closed sandbox.");
        Ok(())
    }
}
