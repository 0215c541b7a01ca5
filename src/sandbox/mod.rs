//! Sandbox side: the page runtime and the call it drives.
//!
//! The host only reaches the sandbox through the bridge, so this module's
//! entry point is [`serve`], which answers host requests arriving on a reader
//! and sends calls back on a writer.

pub mod call;
pub mod page;

pub use call::{CallOutcome, CallSession, CallState};
pub use page::{Page, PageError, SandboxEnv};

use crate::bridge::{FrameReader, HostMessage, SandboxBridge, TransportError};
use crate::capture::SimulatedCapture;
use crate::config::SandboxArgs;
use crate::telephony::SimulatedDeviceFactory;
use crate::utils::logging::render_error;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};

/// Serve host requests until the host closes the stream
pub async fn serve<R, W>(reader: R, writer: W, env: SandboxEnv) -> Result<(), TransportError>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (bridge, _writer_task) = SandboxBridge::spawn(writer);
    let page = Page::new(bridge.clone(), env);
    let mut frames = FrameReader::new(reader);

    let result = loop {
        match frames.read_frame::<HostMessage>().await {
            Ok(Some(HostMessage::Navigate { id, url })) => {
                let outcome = page.navigate(&url).await.map_err(|e| e.to_string());
                bridge.complete(id, outcome);
            }
            Ok(Some(HostMessage::Evaluate { id, entry, args })) => {
                let outcome = page.evaluate(&entry, args).map_err(|e| {
                    let message = e.to_string();
                    bridge.error(render_error(&anyhow::Error::new(e)));
                    message
                });
                bridge.complete(id, outcome);
            }
            Ok(None) => break Ok(()),
            Err(e) if e.is_recoverable() => {
                tracing::error!("Malformed message from host: {}", e);
            }
            Err(e) => break Err(e),
        }
    };

    tracing::debug!("Host closed the bridge");
    page.close();
    result
}

/// Run the sandbox on this process's stdin and stdout
pub async fn run_stdio(args: SandboxArgs) -> anyhow::Result<()> {
    let env = SandboxEnv {
        devices: Arc::new(SimulatedDeviceFactory::new(
            args.device.simulated_tracks,
            args.device.call_length(),
        )),
        capture: Arc::new(SimulatedCapture::new()),
    };
    tracing::debug!("Sandbox {} ready", std::process::id());
    serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), env).await?;
    Ok(())
}
