//! Per-track capture session
//!
//! A `TrackRecorder` owns one capture pipeline and forwards the chunks it
//! produces to a `ChunkSink`, which on the sandbox side is the bridge to the
//! host's writer.

use super::state::{RecorderState, RecordingPath, TrackKind, TrackRecording};
use crate::capture::{
    CaptureBackend, CaptureError, CaptureOptions, CapturePipeline, MediaStream, MediaTrack,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Recorder errors
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("recorder cannot start from state {0:?}")]
    InvalidState(RecorderState),

    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),
}

/// Destination for a recorder's output
pub trait ChunkSink: Send + Sync {
    /// Start `path` over from an empty file
    fn create_recording(&self, path: &RecordingPath);

    /// Append one encoded chunk to `path`
    fn append_recording(&self, path: &RecordingPath, chunk: &[u8]);
}

/// Records one media track
pub struct TrackRecorder {
    recording: Arc<Mutex<TrackRecording>>,
    state: Arc<Mutex<RecorderState>>,
    pipeline: Option<Box<dyn CapturePipeline>>,
    forwarder: Option<JoinHandle<()>>,
}

impl TrackRecorder {
    /// Recorder for the track at `track_index` on the connection
    pub fn new(track_index: usize, kind: TrackKind) -> Self {
        Self {
            recording: Arc::new(Mutex::new(TrackRecording::for_track(track_index, kind))),
            state: Arc::new(Mutex::new(RecorderState::Idle)),
            pipeline: None,
            forwarder: None,
        }
    }

    pub fn state(&self) -> RecorderState {
        *self.state.lock()
    }

    /// Snapshot of the recording's bookkeeping
    pub fn recording(&self) -> TrackRecording {
        self.recording.lock().clone()
    }

    /// Create the recording file and start capturing `track`
    pub fn start(
        &mut self,
        track: MediaTrack,
        capture: &dyn CaptureBackend,
        sink: Arc<dyn ChunkSink>,
        timeslice: Duration,
    ) -> Result<(), RecorderError> {
        let current = self.state();
        if current != RecorderState::Idle {
            return Err(RecorderError::InvalidState(current));
        }

        let (file_path, kind) = {
            let recording = self.recording.lock();
            (recording.file_path.clone(), recording.kind)
        };
        sink.create_recording(&file_path);

        let mut stream = MediaStream::new(vec![track]);
        if kind == TrackKind::Video {
            stream.add_track(capture.silent_audio_track());
        }

        let options = CaptureOptions {
            mime_type: kind.mime_type(),
            timeslice,
        };
        let (pipeline, mut chunks) = match capture.open(stream, options) {
            Ok(opened) => opened,
            Err(e) => {
                *self.state.lock() = RecorderState::Stopped;
                return Err(e.into());
            }
        };

        *self.state.lock() = RecorderState::Capturing;
        self.pipeline = Some(pipeline);

        let recording = self.recording.clone();
        let state = self.state.clone();
        self.forwarder = Some(tokio::spawn(async move {
            while let Some(chunk) = chunks.recv().await {
                if chunk.is_empty() {
                    continue;
                }
                let path = {
                    let mut recording = recording.lock();
                    recording.sequence_number += 1;
                    recording.file_path.clone()
                };
                sink.append_recording(&path, &chunk);
            }
            *state.lock() = RecorderState::Stopped;
        }));

        Ok(())
    }

    /// Stop the pipeline. No chunks are produced afterwards.
    pub fn stop(&mut self) {
        if let Some(mut pipeline) = self.pipeline.take() {
            pipeline.stop();
        }
        *self.state.lock() = RecorderState::Stopped;
    }

    /// Wait until every chunk produced before `stop` has been forwarded
    pub async fn drained(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            let _ = forwarder.await;
        }
    }
}
