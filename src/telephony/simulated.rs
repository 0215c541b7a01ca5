//! Simulated telephony device.
//!
//! Becomes ready immediately, "answers" every call with a fixed number of
//! inbound audio tracks carrying a sine tone, and hangs up after a fixed
//! call length. Used by the sandbox binary and by tests.

use super::device::{
    ConnectParams, Connection, DeviceError, DeviceEvent, DeviceEvents, DeviceFactory,
    DeviceOptions, TelephonyDevice,
};
use crate::capture::{MediaTrack, TrackFeed};
use crate::recorder::TrackKind;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const SAMPLE_RATE: u32 = 8000;
const FRAME: Duration = Duration::from_millis(20);

/// Builds [`SimulatedDevice`]s
#[derive(Debug, Clone)]
pub struct SimulatedDeviceFactory {
    tracks: usize,
    call_length: Duration,
    tone_hz: f32,
}

impl SimulatedDeviceFactory {
    pub fn new(tracks: usize, call_length: Duration) -> Self {
        Self {
            tracks,
            call_length,
            tone_hz: 440.0,
        }
    }
}

impl DeviceFactory for SimulatedDeviceFactory {
    fn create(
        &self,
        token: &str,
        options: DeviceOptions,
    ) -> Result<(Arc<dyn TelephonyDevice>, DeviceEvents), DeviceError> {
        if token.trim().is_empty() {
            return Err(DeviceError::InvalidToken);
        }
        tracing::debug!(
            "Simulated device created (codecs {:?}, fake DTMF {})",
            options.codec_preferences,
            options.fake_local_dtmf
        );

        let (events, rx) = mpsc::unbounded_channel();
        let _ = events.send(DeviceEvent::Ready);
        let device = SimulatedDevice {
            config: self.clone(),
            events,
            destroyed: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        };
        Ok((Arc::new(device), rx))
    }
}

/// A device that calls nobody and always gets an answer
pub struct SimulatedDevice {
    config: SimulatedDeviceFactory,
    events: mpsc::UnboundedSender<DeviceEvent>,
    destroyed: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TelephonyDevice for SimulatedDevice {
    fn connect(&self, params: ConnectParams) -> Result<(), DeviceError> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(DeviceError::Destroyed);
        }
        if params.to.trim().is_empty() {
            return Err(DeviceError::Failed("no destination given".to_string()));
        }

        let tracks: Vec<MediaTrack> = (0..self.config.tracks)
            .map(|i| MediaTrack::new(format!("remote-audio-{i}"), TrackKind::Audio))
            .collect();
        let mut tasks = self.tasks.lock();
        for (i, track) in tracks.iter().enumerate() {
            // Slightly different pitch per track so recordings are distinguishable
            let hz = self.config.tone_hz * (1.0 + i as f32 * 0.25);
            tasks.push(tokio::spawn(generate_tone(track.feed.clone(), hz)));
        }

        let connection = Connection::new(format!("sim-{}", params.to), tracks);
        let events = self.events.clone();
        let call_length = self.config.call_length;
        tasks.push(tokio::spawn(async move {
            let _ = events.send(DeviceEvent::Connect(connection.clone()));
            tokio::time::sleep(call_length).await;
            let _ = events.send(DeviceEvent::Disconnect(connection));
        }));
        Ok(())
    }

    fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

/// Push 16-bit little-endian PCM of a sine tone into `feed`, one frame at a time
async fn generate_tone(feed: TrackFeed, hz: f32) {
    let samples_per_frame = (SAMPLE_RATE as u128 * FRAME.as_millis() / 1000) as usize;
    let step = 2.0 * std::f32::consts::PI * hz / SAMPLE_RATE as f32;
    let mut phase = 0.0f32;
    let mut ticker = tokio::time::interval(FRAME);
    let mut frame = Vec::with_capacity(samples_per_frame * 2);

    loop {
        ticker.tick().await;
        frame.clear();
        for _ in 0..samples_per_frame {
            let sample = (phase.sin() * 0.3 * i16::MAX as f32) as i16;
            frame.extend_from_slice(&sample.to_le_bytes());
            phase = (phase + step) % (2.0 * std::f32::consts::PI);
        }
        feed.push(&frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telephony::Codec;

    fn options() -> DeviceOptions {
        DeviceOptions {
            codec_preferences: vec![Codec::Opus, Codec::Pcmu],
            fake_local_dtmf: false,
        }
    }

    #[tokio::test]
    async fn test_rejects_empty_token() {
        let factory = SimulatedDeviceFactory::new(1, Duration::from_secs(1));
        assert_eq!(
            factory.create("  ", options()).err(),
            Some(DeviceError::InvalidToken)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_lifecycle() {
        let factory = SimulatedDeviceFactory::new(2, Duration::from_secs(1));
        let (device, mut events) = factory.create("token", options()).unwrap();

        assert!(matches!(events.recv().await, Some(DeviceEvent::Ready)));
        device
            .connect(ConnectParams {
                to: "+15550100".to_string(),
            })
            .unwrap();

        let connection = match events.recv().await {
            Some(DeviceEvent::Connect(connection)) => connection,
            other => panic!("expected connect, got {other:?}"),
        };
        let tracks = connection.audio_tracks();
        assert_eq!(tracks.len(), 2);

        tokio::time::sleep(Duration::from_millis(100)).await;
        // 8 kHz, 16-bit: 320 bytes per 20 ms frame
        let produced = tracks[0].feed.drain();
        assert!(produced.len() >= 320 && produced.len() % 320 == 0);

        assert!(matches!(events.recv().await, Some(DeviceEvent::Disconnect(_))));

        device.destroy();
        device.destroy();
        assert_eq!(
            device.connect(ConnectParams { to: "x".into() }),
            Err(DeviceError::Destroyed)
        );
    }
}
