//! Call session
//!
//! Drives one telephony device through its lifecycle and owns the recorders
//! for the tracks of the established call.

use crate::bridge::SandboxBridge;
use crate::capture::CaptureBackend;
use crate::recorder::{TrackRecorder, TrackRecording};
use crate::telephony::{ConnectParams, Connection, DeviceEvent, DeviceEvents, TelephonyDevice};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Lifecycle of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Device created, waiting for it to become ready
    Created,
    /// Dialing
    Connecting,
    /// Call up, recorders running
    Connected,
    /// Call ended
    Disconnected,
    /// The device reported an error. Absorbing: later ready/connect events
    /// start nothing.
    Errored,
}

/// Why [`CallSession::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// The device reported the end of the call
    Disconnected,
    /// The device dropped its event stream
    EventsClosed,
}

pub struct CallSession {
    id: Uuid,
    call_target: String,
    device: Arc<dyn TelephonyDevice>,
    bridge: SandboxBridge,
    capture: Arc<dyn CaptureBackend>,
    timeslice: Duration,
    /// Shared with the page; set once teardown starts
    closing: Arc<AtomicBool>,
    state: Mutex<CallState>,
    connection: Mutex<Option<Connection>>,
    connected_at: Mutex<Option<DateTime<Utc>>>,
    /// Indexed by track index
    recorders: Mutex<Vec<TrackRecorder>>,
}

impl CallSession {
    pub fn new(
        call_target: impl Into<String>,
        device: Arc<dyn TelephonyDevice>,
        bridge: SandboxBridge,
        capture: Arc<dyn CaptureBackend>,
        timeslice: Duration,
        closing: Arc<AtomicBool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            call_target: call_target.into(),
            device,
            bridge,
            capture,
            timeslice,
            closing,
            state: Mutex::new(CallState::Created),
            connection: Mutex::new(None),
            connected_at: Mutex::new(None),
            recorders: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> CallState {
        *self.state.lock()
    }

    /// Identifier of the established connection, if any
    pub fn connection_id(&self) -> Option<String> {
        self.connection.lock().as_ref().map(|c| c.id.clone())
    }

    /// Bookkeeping of every recorder, by track index
    pub fn recordings(&self) -> Vec<TrackRecording> {
        self.recorders.lock().iter().map(TrackRecorder::recording).collect()
    }

    /// Handle device events until the call ends
    pub async fn run(self: Arc<Self>, mut events: DeviceEvents) -> CallOutcome {
        while let Some(event) = events.recv().await {
            if let Some(outcome) = self.handle_event(event) {
                return outcome;
            }
        }
        CallOutcome::EventsClosed
    }

    /// Stop every recorder, then destroy the device.
    ///
    /// Marks the session closing under the recorder lock, so no recorder can
    /// start after this returns.
    pub fn shutdown(&self) {
        let mut recorders = self.recorders.lock();
        self.closing.store(true, Ordering::SeqCst);
        for recorder in recorders.iter_mut() {
            recorder.stop();
        }
        drop(recorders);
        self.device.destroy();
    }

    fn handle_event(&self, event: DeviceEvent) -> Option<CallOutcome> {
        match event {
            DeviceEvent::Ready => {
                self.bridge.debug("Device Ready.");
                self.on_ready();
                None
            }
            DeviceEvent::Connect(connection) => {
                self.bridge.debug("Device Connected.");
                self.on_connect(connection);
                None
            }
            DeviceEvent::Disconnect(_) => {
                self.bridge.info("Call ended.");
                if let Some(connected_at) = *self.connected_at.lock() {
                    let seconds = (Utc::now() - connected_at).num_seconds();
                    self.bridge.debug(format!("Call lasted {seconds}s."));
                }
                let mut state = self.state.lock();
                if *state != CallState::Errored {
                    *state = CallState::Disconnected;
                }
                Some(CallOutcome::Disconnected)
            }
            DeviceEvent::Error(message) => {
                self.bridge.error(format!("Device {message}"));
                *self.state.lock() = CallState::Errored;
                None
            }
        }
    }

    /// Whether a transition out of `from` may start now
    fn may_leave(&self, from: CallState) -> bool {
        if self.closing.load(Ordering::SeqCst) {
            self.bridge.debug("Closing, ignoring device event.");
            return false;
        }
        let current = self.state();
        if current != from {
            self.bridge
                .debug(format!("Ignoring device event in state {current:?}."));
            return false;
        }
        true
    }

    fn on_ready(&self) {
        if !self.may_leave(CallState::Created) {
            return;
        }
        self.bridge
            .info(format!("Connecting to {}...", self.call_target));
        let params = ConnectParams {
            to: self.call_target.clone(),
        };
        match self.device.connect(params) {
            Ok(()) => *self.state.lock() = CallState::Connecting,
            Err(e) => {
                self.bridge.error(format!("Device {e}"));
                *self.state.lock() = CallState::Errored;
            }
        }
    }

    fn on_connect(&self, connection: Connection) {
        if !self.may_leave(CallState::Connecting) {
            return;
        }

        let mut recorders = self.recorders.lock();
        // shutdown() may have run since may_leave
        if self.closing.load(Ordering::SeqCst) {
            self.bridge.debug("Closing, not starting recorders.");
            return;
        }
        let sink = Arc::new(self.bridge.clone());
        for (track_index, track) in connection.audio_tracks().into_iter().enumerate() {
            let mut recorder = TrackRecorder::new(track_index, track.kind);
            let file_path = recorder.recording().file_path;
            self.bridge.info(format!("Beginning {file_path}."));
            if let Err(e) = recorder.start(
                track,
                self.capture.as_ref(),
                sink.clone(),
                self.timeslice,
            ) {
                self.bridge
                    .error(format!("Recording {file_path} failed to start: {e}"));
            }
            recorders.push(recorder);
        }

        *self.connection.lock() = Some(connection);
        *self.connected_at.lock() = Some(Utc::now());
        *self.state.lock() = CallState::Connected;
    }
}
