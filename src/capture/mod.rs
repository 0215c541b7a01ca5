//! Media capture collaborator
//!
//! Traits describing the capture primitives the recorder uses, plus a
//! simulated backend for running without native media support.

pub mod simulated;
pub mod traits;

pub use simulated::SimulatedCapture;
pub use traits::{
    CaptureBackend, CaptureError, CaptureOptions, CapturePipeline, ChunkReceiver, MediaStream,
    MediaTrack, TrackFeed, DEFAULT_TIMESLICE,
};
