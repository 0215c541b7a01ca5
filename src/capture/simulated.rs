//! In-process capture backend.
//!
//! Stands in for the native media recorder: every timeslice it drains the raw
//! feed of each track in the stream and emits the concatenation as one chunk.
//! Ticks with no data produce empty chunks, just like the real recorder does.

use super::traits::{
    CaptureBackend, CaptureError, CaptureOptions, CapturePipeline, ChunkReceiver, MediaStream,
    MediaTrack,
};
use crate::recorder::state::TrackKind;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

const SUPPORTED_MIME_TYPES: [&str; 2] = ["audio/webm", "video/webm"];

#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedCapture;

impl SimulatedCapture {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureBackend for SimulatedCapture {
    fn open(
        &self,
        stream: MediaStream,
        options: CaptureOptions,
    ) -> Result<(Box<dyn CapturePipeline>, ChunkReceiver), CaptureError> {
        if !SUPPORTED_MIME_TYPES.contains(&options.mime_type.as_str()) {
            return Err(CaptureError::UnsupportedMimeType(options.mime_type));
        }
        if stream.tracks().is_empty() {
            return Err(CaptureError::EmptyStream);
        }

        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let timeslice = options.timeslice;

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + timeslice, timeslice);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let chunk: Vec<u8> = stream
                            .tracks()
                            .iter()
                            .flat_map(|track| track.feed.drain())
                            .collect();
                        if chunk_tx.send(chunk).is_err() {
                            break;
                        }
                    }
                }
            }
            // Final partial chunk, as a recorder emits on stop
            let rest: Vec<u8> = stream
                .tracks()
                .iter()
                .flat_map(|track| track.feed.drain())
                .collect();
            let _ = chunk_tx.send(rest);
        });

        let pipeline = SimulatedPipeline {
            mime_type: options.mime_type,
            stop: Some(stop_tx),
        };
        Ok((Box::new(pipeline), chunk_rx))
    }

    fn silent_audio_track(&self) -> MediaTrack {
        // A 0 Hz oscillator never pushes anything into its feed
        MediaTrack::new("silence", TrackKind::Audio)
    }
}

struct SimulatedPipeline {
    mime_type: String,
    stop: Option<oneshot::Sender<()>>,
}

impl CapturePipeline for SimulatedPipeline {
    fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

impl Drop for SimulatedPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
