//! Recording system module
//!
//! - `TrackRecorder`: per-track capture, runs inside the sandbox
//! - `ChunkWriter`: append-only persistence, runs in the host
//! - recording state and paths shared by both

pub mod state;
pub mod track;
pub mod writer;

pub use state::{PathError, RecorderState, RecordingPath, TrackKind, TrackRecording};
pub use track::{ChunkSink, RecorderError, TrackRecorder};
pub use writer::{ChunkWriter, WriterError, WriterResult};
