//! Host side: serves the page, launches the sandbox, persists recordings and
//! shuts everything down.

pub mod process;
pub mod server;
pub mod shutdown;
pub mod signals;

pub use process::{InProcessLauncher, ProcessLauncher, SandboxHandle, SandboxLauncher};
pub use server::HttpServer;
pub use shutdown::{ShutdownCause, ShutdownCoordinator, ShutdownState, TeardownStage, TeardownStep};

use crate::bridge::protocol::{ENTRY_CLOSE, ENTRY_MAIN};
use crate::bridge::{BridgeHost, ExposedFunctions, TransportError};
use crate::config::HostConfig;
use crate::recorder::ChunkWriter;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Run one call to completion and return the exit code
pub async fn run(
    config: HostConfig,
    launcher: &dyn SandboxLauncher,
    shutdown: Arc<ShutdownCoordinator>,
) -> i32 {
    if let Err(e) = start(&config, launcher, &shutdown).await {
        shutdown.shutdown(ShutdownCause::Fatal(e)).await;
    }
    shutdown.stopped().await
}

/// Log the PID and how to stop the recording
pub fn log_banner() {
    let pid = std::process::id();
    tracing::info!(
        "\n
  call-recorder's PID is {pid}.

  You can send SIGUSR2 to this PID to stop recording and hang up.
  For example,

    kill -s USR2 {pid}

  Happy recording!\n"
    );
}

/// Escalate panics anywhere in the process to a fatal shutdown
pub fn install_panic_hook(shutdown: Arc<ShutdownCoordinator>) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        previous(info);
        shutdown.trigger(ShutdownCause::Fatal(anyhow!("panic: {info}")));
    }));
}

async fn start(
    config: &HostConfig,
    launcher: &dyn SandboxLauncher,
    shutdown: &Arc<ShutdownCoordinator>,
) -> anyhow::Result<()> {
    let writer = Arc::new(ChunkWriter::new(&config.output_dir));

    tracing::debug!("Starting HTTP server...");
    let server = Arc::new(HttpServer::start(config.port, &config.bundle).await?);
    shutdown.register(TeardownStage::HttpServer, server.clone());
    tracing::info!(
        "Started HTTP server. Listening on {}.",
        server.local_addr().port()
    );

    tracing::debug!("Launching sandbox...");
    let sandbox = launcher.launch().await.context("launching sandbox")?;
    shutdown.register(TeardownStage::SandboxContext, sandbox.context.clone());
    tracing::info!("Launched sandbox.");

    tracing::debug!("Registering callback(s)...");
    let functions = Arc::new(ExposedFunctions::new(writer, shutdown.clone()));
    let (bridge, reader) = BridgeHost::connect(sandbox.reader, sandbox.writer, functions);
    shutdown.register(
        TeardownStage::SandboxTeardown,
        Arc::new(PageTeardown {
            bridge: bridge.clone(),
            timeout: config.teardown_timeout,
        }),
    );
    watch_bridge(reader, shutdown.clone());
    tracing::debug!("Registered callback(s).");

    let url = server.url();
    tracing::debug!("Navigating to {}...", url);
    bridge.navigate(&url).await?;
    tracing::debug!("Navigated to {}.", url);

    if !shutdown.is_running() {
        tracing::debug!("Shutting down, not starting the call");
        return Ok(());
    }
    bridge
        .evaluate(
            ENTRY_MAIN,
            vec![config.token.clone(), config.target.clone()],
        )
        .await?;
    Ok(())
}

/// The sandbox going away while the host still runs is fatal
fn watch_bridge(
    reader: JoinHandle<Result<(), TransportError>>,
    shutdown: Arc<ShutdownCoordinator>,
) {
    tokio::spawn(async move {
        let ended = reader.await;
        if !shutdown.is_running() {
            return;
        }
        let error = match ended {
            Ok(Ok(())) => anyhow!("sandbox closed the bridge"),
            Ok(Err(e)) => anyhow::Error::new(e).context("bridge to sandbox failed"),
            Err(e) => anyhow::Error::new(e).context("bridge reader failed"),
        };
        shutdown.trigger(ShutdownCause::Fatal(error));
    });
}

/// Runs the page's own `close()` before the sandbox is disposed of
struct PageTeardown {
    bridge: Arc<BridgeHost>,
    timeout: Duration,
}

#[async_trait]
impl TeardownStep for PageTeardown {
    fn name(&self) -> &'static str {
        "page close()"
    }

    async fn run(&self) -> anyhow::Result<()> {
        tokio::time::timeout(self.timeout, self.bridge.evaluate(ENTRY_CLOSE, vec![]))
            .await
            .map_err(|_| anyhow!("page did not run close() within {:?}", self.timeout))??;
        Ok(())
    }
}
