//! Host end of the bridge.
//!
//! Owns the connection to the sandbox: a writer task that sends
//! [`HostMessage`]s in order and a reader task that routes incoming
//! [`SandboxMessage`]s either to the exposed functions or to the caller
//! waiting on an `evaluate`/`navigate` acknowledgement.

use super::protocol::{HostCall, HostMessage, SandboxMessage};
use super::transport::{FrameReader, FrameWriter, TransportError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Bridge errors
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("sandbox is not connected")]
    Disconnected,

    #[error("evaluating {entry}() failed: {message}")]
    Evaluation { entry: String, message: String },

    #[error("navigating to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Receiver of the calls the sandbox makes into the host
pub trait HostFunctions: Send + Sync {
    /// Handle one call. Must not block: long work is spawned.
    fn invoke(&self, call: HostCall);
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Option<String>>>>>;

/// Handle used by the host to drive the sandbox
pub struct BridgeHost {
    outbound: mpsc::UnboundedSender<HostMessage>,
    pending: Pending,
    next_id: AtomicU64,
}

impl BridgeHost {
    /// Start serving the bridge over `reader`/`writer`.
    ///
    /// The returned task finishes when the sandbox side closes the stream
    /// (`Ok`) or the stream fails (`Err`).
    pub fn connect<R, W>(
        reader: R,
        writer: W,
        functions: Arc<dyn HostFunctions>,
    ) -> (Arc<Self>, JoinHandle<Result<(), TransportError>>)
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<HostMessage>();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));

        let write_pending = pending.clone();
        tokio::spawn(async move {
            let mut frames = FrameWriter::new(writer);
            while let Some(message) = outbound_rx.recv().await {
                if let Err(e) = frames.write_frame(&message).await {
                    tracing::error!("Failed to send to sandbox: {}", e);
                    // Wakes the waiter with `Disconnected`
                    write_pending.lock().remove(&message.id());
                }
            }
        });

        let read_pending = pending.clone();
        let reader_task = tokio::spawn(async move {
            let mut frames = FrameReader::new(reader);
            let result = loop {
                match frames.read_frame::<SandboxMessage>().await {
                    Ok(Some(SandboxMessage::Invoke { call })) => functions.invoke(call),
                    Ok(Some(SandboxMessage::Completed { id, error })) => {
                        match read_pending.lock().remove(&id) {
                            Some(waiter) => {
                                let _ = waiter.send(error);
                            }
                            None => tracing::warn!("Completion for unknown request {}", id),
                        }
                    }
                    Ok(None) => break Ok(()),
                    Err(e) if e.is_recoverable() => {
                        tracing::error!("Malformed message from sandbox: {}", e);
                    }
                    Err(e) => break Err(e),
                }
            };
            read_pending.lock().clear();
            result
        });

        let host = Arc::new(Self {
            outbound,
            pending,
            next_id: AtomicU64::new(1),
        });
        (host, reader_task)
    }

    /// Invoke `entry(args...)` inside the sandbox.
    ///
    /// Resolves once the sandbox has started the entry point; whatever async
    /// work it kicks off is not awaited.
    pub async fn evaluate(&self, entry: &str, args: Vec<String>) -> Result<(), BridgeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Evaluating {}() in sandbox", entry);
        let reply = self.request(HostMessage::Evaluate {
            id,
            entry: entry.to_string(),
            args,
        })?;
        match reply.await {
            Ok(None) => Ok(()),
            Ok(Some(message)) => Err(BridgeError::Evaluation {
                entry: entry.to_string(),
                message,
            }),
            Err(_) => Err(BridgeError::Disconnected),
        }
    }

    /// Load the page at `url` inside the sandbox
    pub async fn navigate(&self, url: &str) -> Result<(), BridgeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let reply = self.request(HostMessage::Navigate {
            id,
            url: url.to_string(),
        })?;
        match reply.await {
            Ok(None) => Ok(()),
            Ok(Some(message)) => Err(BridgeError::Navigation {
                url: url.to_string(),
                message,
            }),
            Err(_) => Err(BridgeError::Disconnected),
        }
    }

    fn request(
        &self,
        message: HostMessage,
    ) -> Result<oneshot::Receiver<Option<String>>, BridgeError> {
        let (tx, rx) = oneshot::channel();
        let id = message.id();
        self.pending.lock().insert(id, tx);
        if self.outbound.send(message).is_err() {
            self.pending.lock().remove(&id);
            return Err(BridgeError::Disconnected);
        }
        Ok(rx)
    }
}
