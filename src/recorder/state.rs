//! Recording state management
//!
//! Defines the per-track recorder state machine and the data attached to
//! each track recording.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Current state of a track recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    /// Created, capture not started yet
    Idle,
    /// Capture pipeline running, chunks flowing
    Capturing,
    /// Pipeline stopped. Terminal.
    Stopped,
}

impl Default for RecorderState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Audio => "audio",
            TrackKind::Video => "video",
        }
    }

    /// MIME type requested from the capture pipeline
    pub fn mime_type(&self) -> String {
        format!("{}/webm", self.as_str())
    }
}

/// Rejected recording path
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("recording path has no segments")]
    Empty,

    #[error("invalid path segment {0:?}")]
    InvalidSegment(String),
}

/// Location of a recording, as an ordered list of path segments.
///
/// The last segment is the leaf filename. Segments never escape the root
/// they are resolved against: `.`/`..`, empty segments and separators are
/// rejected at construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordingPath {
    segments: Vec<String>,
}

impl RecordingPath {
    /// Validate a list of segments received from the sandbox
    pub fn from_segments(segments: Vec<String>) -> Result<Self, PathError> {
        if segments.is_empty() {
            return Err(PathError::Empty);
        }
        for segment in &segments {
            let invalid = segment.is_empty()
                || segment == "."
                || segment == ".."
                || segment.contains('/')
                || segment.contains('\\')
                || segment.contains('\0');
            if invalid {
                return Err(PathError::InvalidSegment(segment.clone()));
            }
        }
        Ok(Self { segments })
    }

    /// Path made of a single leaf filename
    pub fn leaf(name: impl Into<String>) -> Result<Self, PathError> {
        Self::from_segments(vec![name.into()])
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Resolve against a root directory
    pub fn resolve(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        path.extend(self.segments.iter());
        path
    }
}

impl fmt::Display for RecordingPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

/// Information about one track's recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRecording {
    /// Position of the track among the connection's tracks
    pub track_index: usize,

    /// Where the chunks are persisted
    pub file_path: RecordingPath,

    pub kind: TrackKind,

    /// Number of non-empty chunks forwarded so far
    pub sequence_number: u64,
}

impl TrackRecording {
    /// Recording for the track at `track_index`, stored as `{track_index}.ogg`
    pub fn for_track(track_index: usize, kind: TrackKind) -> Self {
        let file_path = RecordingPath {
            segments: vec![format!("{track_index}.ogg")],
        };
        Self {
            track_index,
            file_path,
            kind,
            sequence_number: 0,
        }
    }
}
