//! Append-only recording persistence
//!
//! Every recording path gets its own lane: an unbounded FIFO queue drained by
//! a dedicated task that owns the file handle. Operations are queued the
//! moment `create`/`append` is called, so writes to one file happen strictly
//! in call order while different files are written concurrently.

use super::state::RecordingPath;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};

/// Persistence errors
#[derive(Error, Debug)]
pub enum WriterError {
    #[error("failed to create {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to append to {path}: {source}")]
    Append {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("refusing to append to {0}: it was never created")]
    NotCreated(PathBuf),

    #[error("writer lane for {0} shut down")]
    LaneClosed(PathBuf),
}

pub type WriterResult<T> = Result<T, WriterError>;

enum LaneOp {
    Create(oneshot::Sender<WriterResult<()>>),
    Append(Vec<u8>, oneshot::Sender<WriterResult<usize>>),
    Flush(oneshot::Sender<()>),
}

/// Persists recording chunks under a root directory
pub struct ChunkWriter {
    root: PathBuf,
    lanes: Mutex<HashMap<PathBuf, mpsc::UnboundedSender<LaneOp>>>,
}

impl ChunkWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lanes: Mutex::new(HashMap::new()),
        }
    }

    /// Prepare `path` for a fresh recording.
    ///
    /// Creates the parent directories, removes whatever file was there and
    /// leaves an empty file behind. Queued immediately; the future only
    /// reports the outcome.
    pub fn create(
        &self,
        path: &RecordingPath,
    ) -> impl Future<Output = WriterResult<()>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let target = self.submit(path, LaneOp::Create(tx));
        async move { rx.await.unwrap_or(Err(WriterError::LaneClosed(target))) }
    }

    /// Append `payload` to the file at `path`, returning the bytes written.
    ///
    /// Refused unless an earlier `create` of the same path succeeded, so a
    /// file is only ever appended to after it was truncated.
    ///
    /// Queued immediately; the future only reports the outcome.
    pub fn append(
        &self,
        path: &RecordingPath,
        payload: Vec<u8>,
    ) -> impl Future<Output = WriterResult<usize>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let target = self.submit(path, LaneOp::Append(payload, tx));
        async move { rx.await.unwrap_or(Err(WriterError::LaneClosed(target))) }
    }

    /// Resolves once every operation queued so far for `path` has finished
    pub fn flush(&self, path: &RecordingPath) -> impl Future<Output = ()> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        self.submit(path, LaneOp::Flush(tx));
        async move {
            let _ = rx.await;
        }
    }

    fn submit(&self, path: &RecordingPath, op: LaneOp) -> PathBuf {
        let target = path.resolve(&self.root);
        let mut lanes = self.lanes.lock();
        let lane = lanes
            .entry(target.clone())
            .or_insert_with(|| spawn_lane(target.clone()));

        if let Err(mpsc::error::SendError(op)) = lane.send(op) {
            // The lane task is gone (runtime shutting down); start a new one.
            tracing::warn!("Restarting writer lane for {}", target.display());
            let fresh = spawn_lane(target.clone());
            let _ = fresh.send(op);
            *lane = fresh;
        }
        target
    }
}

fn spawn_lane(path: PathBuf) -> mpsc::UnboundedSender<LaneOp> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run_lane(path, rx));
    tx
}

async fn run_lane(path: PathBuf, mut ops: mpsc::UnboundedReceiver<LaneOp>) {
    let mut file: Option<File> = None;
    let mut created = false;

    while let Some(op) = ops.recv().await {
        match op {
            LaneOp::Create(reply) => {
                file = None;
                let result = match recreate(&path).await {
                    Ok(fresh) => {
                        file = Some(fresh);
                        Ok(())
                    }
                    Err(source) => Err(WriterError::Create {
                        path: path.clone(),
                        source,
                    }),
                };
                created = result.is_ok();
                let _ = reply.send(result);
            }
            LaneOp::Append(_, reply) if !created => {
                let _ = reply.send(Err(WriterError::NotCreated(path.clone())));
            }
            LaneOp::Append(payload, reply) => {
                let result = append_to(&mut file, &path, &payload)
                    .await
                    .map(|()| payload.len())
                    .map_err(|source| {
                        // Reopen on the next append rather than reuse a broken handle
                        file = None;
                        WriterError::Append {
                            path: path.clone(),
                            source,
                        }
                    });
                let _ = reply.send(result);
            }
            LaneOp::Flush(reply) => {
                let _ = reply.send(());
            }
        }
    }
}

async fn recreate(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    OpenOptions::new().create(true).append(true).open(path).await
}

async fn append_to(file: &mut Option<File>, path: &Path, payload: &[u8]) -> io::Result<()> {
    if file.is_none() {
        *file = Some(OpenOptions::new().create(true).append(true).open(path).await?);
    }
    if let Some(handle) = file.as_mut() {
        handle.write_all(payload).await?;
        handle.flush().await?;
    }
    Ok(())
}
