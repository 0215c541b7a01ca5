//! Capture trait definitions
//!
//! The sandbox's native media capture is an external collaborator. These
//! types describe the part of it the recorder relies on: tracks, streams
//! built from tracks, and a pipeline that turns a stream into encoded chunks
//! at a fixed cadence.

use crate::recorder::state::TrackKind;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Default interval between two chunks
pub const DEFAULT_TIMESLICE: Duration = Duration::from_millis(100);

/// Capture-related errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("unsupported MIME type: {0}")]
    UnsupportedMimeType(String),

    #[error("stream has no tracks")]
    EmptyStream,
}

/// Raw media flowing out of a track, before encoding.
///
/// Producers push, the capture pipeline drains.
#[derive(Debug, Clone, Default)]
pub struct TrackFeed {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl TrackFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, data: &[u8]) {
        self.buffer.lock().extend_from_slice(data);
    }

    /// Take everything produced since the last drain
    pub fn drain(&self) -> Vec<u8> {
        std::mem::take(&mut *self.buffer.lock())
    }
}

/// A single media track
#[derive(Debug, Clone)]
pub struct MediaTrack {
    /// Track identifier as reported by its source
    pub id: String,

    pub kind: TrackKind,

    pub feed: TrackFeed,
}

impl MediaTrack {
    pub fn new(id: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: id.into(),
            kind,
            feed: TrackFeed::new(),
        }
    }
}

/// A set of tracks captured together
#[derive(Debug, Clone, Default)]
pub struct MediaStream {
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self { tracks }
    }

    pub fn add_track(&mut self, track: MediaTrack) {
        self.tracks.push(track);
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }
}

/// Options for opening a capture pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOptions {
    /// e.g. `audio/webm`
    pub mime_type: String,

    /// Interval between two chunks
    pub timeslice: Duration,
}

/// Encoded chunks produced by a running pipeline.
///
/// The channel closes once the pipeline has stopped.
pub type ChunkReceiver = mpsc::UnboundedReceiver<Vec<u8>>;

/// A running capture pipeline
pub trait CapturePipeline: Send {
    /// Stop producing chunks. Idempotent.
    fn stop(&mut self);

    fn mime_type(&self) -> &str;
}

/// Builds capture pipelines
pub trait CaptureBackend: Send + Sync {
    /// Open a pipeline over `stream`; chunks arrive on the returned receiver
    fn open(
        &self,
        stream: MediaStream,
        options: CaptureOptions,
    ) -> Result<(Box<dyn CapturePipeline>, ChunkReceiver), CaptureError>;

    /// A silent audio track (a 0 Hz oscillator).
    ///
    /// Video-only streams do not capture reliably, so recorders mix one of
    /// these into every video stream.
    fn silent_audio_track(&self) -> MediaTrack;
}
