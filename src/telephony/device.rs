//! Telephony collaborator interface
//!
//! The calling SDK is external. The session only needs to create a device,
//! receive its lifecycle events, ask it to dial, read the inbound tracks off
//! a connection, and destroy it.

use crate::capture::MediaTrack;
use crate::recorder::TrackKind;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Audio codecs, in preference order when passed to a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    Opus,
    Pcmu,
}

/// Options a device is created with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceOptions {
    pub codec_preferences: Vec<Codec>,
    pub fake_local_dtmf: bool,
}

/// Parameters for placing a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    /// Destination address
    pub to: String,
}

/// An established call leg
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: String,
    remote_tracks: Vec<MediaTrack>,
}

impl Connection {
    pub fn new(id: impl Into<String>, remote_tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: id.into(),
            remote_tracks,
        }
    }

    /// Inbound audio tracks, in the order the device reports them
    pub fn audio_tracks(&self) -> Vec<MediaTrack> {
        self.remote_tracks
            .iter()
            .filter(|t| t.kind == TrackKind::Audio)
            .cloned()
            .collect()
    }
}

/// Lifecycle events emitted by a device
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    Ready,
    Error(String),
    Connect(Connection),
    Disconnect(Connection),
}

/// Stream of device events
pub type DeviceEvents = mpsc::UnboundedReceiver<DeviceEvent>;

/// Device errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("access token is missing or invalid")]
    InvalidToken,

    #[error("device has been destroyed")]
    Destroyed,

    #[error("{0}")]
    Failed(String),
}

/// A telephony client
pub trait TelephonyDevice: Send + Sync {
    /// Place a call; the outcome arrives as `Connect`/`Error` events
    fn connect(&self, params: ConnectParams) -> Result<(), DeviceError>;

    /// Hang up and release everything. Idempotent.
    fn destroy(&self);
}

/// Creates devices from an access token
pub trait DeviceFactory: Send + Sync {
    fn create(
        &self,
        token: &str,
        options: DeviceOptions,
    ) -> Result<(Arc<dyn TelephonyDevice>, DeviceEvents), DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_tracks_keep_reported_order() {
        let connection = Connection::new(
            "CA1",
            vec![
                MediaTrack::new("b", TrackKind::Audio),
                MediaTrack::new("v", TrackKind::Video),
                MediaTrack::new("a", TrackKind::Audio),
            ],
        );
        let ids: Vec<_> = connection.audio_tracks().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}
