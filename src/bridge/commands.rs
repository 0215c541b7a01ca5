//! Host functions exposed to the sandbox
//!
//! These are the only calls the sandbox can make into the host: shutdown,
//! logging, and the two recording operations.

use super::codec;
use super::host::HostFunctions;
use super::protocol::HostCall;
use crate::host::shutdown::{ShutdownCause, ShutdownCoordinator};
use crate::recorder::{ChunkWriter, RecordingPath};
use crate::utils::logging::render_error;
use std::sync::Arc;

/// Log target for messages forwarded from the sandbox
pub const SANDBOX_LOG_TARGET: &str = "sandbox";

/// Dispatches sandbox calls to the writer, the logger and the shutdown coordinator
pub struct ExposedFunctions {
    writer: Arc<ChunkWriter>,
    shutdown: Arc<ShutdownCoordinator>,
}

impl ExposedFunctions {
    pub fn new(writer: Arc<ChunkWriter>, shutdown: Arc<ShutdownCoordinator>) -> Self {
        Self { writer, shutdown }
    }

    fn create_recording(&self, segments: Vec<String>) {
        let path = match RecordingPath::from_segments(segments) {
            Ok(path) => path,
            Err(e) => {
                tracing::error!("createRecording rejected: {}", e);
                return;
            }
        };
        if !self.shutdown.is_running() {
            tracing::debug!("Not starting {}: shutting down", path);
            return;
        }

        let created = self.writer.create(&path);
        tokio::spawn(async move {
            match created.await {
                Ok(()) => tracing::debug!("Created {}", path),
                Err(e) => tracing::error!("{}", render_error(&e.into())),
            }
        });
    }

    fn append_recording(&self, segments: Vec<String>, payload: String) {
        let path = match RecordingPath::from_segments(segments) {
            Ok(path) => path,
            Err(e) => {
                tracing::error!("appendRecording rejected: {}", e);
                return;
            }
        };
        let chunk = match codec::decode(&payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::error!("appendRecording for {} dropped a chunk: {}", path, e);
                return;
            }
        };

        // Queued here, in arrival order; only the outcome is awaited off-thread.
        // The writer refuses it unless this path's createRecording was accepted.
        let appended = self.writer.append(&path, chunk);
        tokio::spawn(async move {
            match appended.await {
                Ok(written) => tracing::debug!("Wrote chunk ({} bytes)", written),
                Err(e) => tracing::error!("{}", render_error(&e.into())),
            }
        });
    }
}

impl HostFunctions for ExposedFunctions {
    fn invoke(&self, call: HostCall) {
        match call {
            HostCall::CloseBrowser => {
                self.shutdown.trigger(ShutdownCause::SandboxClose);
            }
            HostCall::Debug(message) => tracing::debug!(target: SANDBOX_LOG_TARGET, "{}", message),
            HostCall::Info(message) => tracing::info!(target: SANDBOX_LOG_TARGET, "{}", message),
            HostCall::Error(message) => tracing::error!(target: SANDBOX_LOG_TARGET, "{}", message),
            HostCall::CreateRecording(segments) => self.create_recording(segments),
            HostCall::AppendRecording(segments, payload) => {
                self.append_recording(segments, payload)
            }
        }
    }
}
