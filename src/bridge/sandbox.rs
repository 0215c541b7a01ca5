//! Sandbox end of the bridge.
//!
//! Stubs for the host-exposed functions. Every call is queued on a single
//! ordered channel and written by one task, so calls never block the caller
//! and repeated calls to the same function reach the host in order.

use super::codec;
use super::protocol::{HostCall, SandboxMessage};
use super::transport::FrameWriter;
use crate::recorder::{ChunkSink, RecordingPath};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Cloneable handle for calling into the host
#[derive(Debug, Clone)]
pub struct SandboxBridge {
    outbound: mpsc::UnboundedSender<SandboxMessage>,
}

impl SandboxBridge {
    /// Bridge whose outgoing messages land on the returned receiver
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SandboxMessage>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        (Self { outbound }, rx)
    }

    /// Bridge writing JSON lines to `writer`
    pub fn spawn<W>(writer: W) -> (Self, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (bridge, mut rx) = Self::channel();
        let task = tokio::spawn(async move {
            let mut frames = FrameWriter::new(writer);
            while let Some(message) = rx.recv().await {
                if let Err(e) = frames.write_frame(&message).await {
                    tracing::error!("Host unreachable: {}", e);
                    break;
                }
            }
        });
        (bridge, task)
    }

    fn send(&self, message: SandboxMessage) {
        if self.outbound.send(message).is_err() {
            tracing::warn!("Bridge closed, dropping message");
        }
    }

    fn invoke(&self, call: HostCall) {
        self.send(SandboxMessage::Invoke { call });
    }

    /// Ask the host to tear everything down
    pub fn close_browser(&self) {
        self.invoke(HostCall::CloseBrowser);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.invoke(HostCall::Debug(message.into()));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.invoke(HostCall::Info(message.into()));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.invoke(HostCall::Error(message.into()));
    }

    /// Acknowledge the host request `id`
    pub fn complete(&self, id: u64, result: Result<(), String>) {
        self.send(SandboxMessage::Completed {
            id,
            error: result.err(),
        });
    }
}

impl ChunkSink for SandboxBridge {
    fn create_recording(&self, path: &RecordingPath) {
        self.invoke(HostCall::CreateRecording(path.segments().to_vec()));
    }

    fn append_recording(&self, path: &RecordingPath, chunk: &[u8]) {
        self.invoke(HostCall::AppendRecording(
            path.segments().to_vec(),
            codec::encode(chunk),
        ));
    }
}
