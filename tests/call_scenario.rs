//! End-to-end: host and sandbox wired over an in-memory pipe, with a scripted
//! telephony device and a capture backend fed by the test.

use call_recorder::bridge::PageBundle;
use call_recorder::capture::{
    CaptureBackend, CaptureError, CaptureOptions, CapturePipeline, ChunkReceiver, MediaStream,
    MediaTrack,
};
use call_recorder::config::HostConfig;
use call_recorder::host::{self, InProcessLauncher, ShutdownCause, ShutdownCoordinator, ShutdownState};
use call_recorder::recorder::TrackKind;
use call_recorder::sandbox::SandboxEnv;
use call_recorder::telephony::{
    ConnectParams, Connection, DeviceError, DeviceEvent, DeviceEvents, DeviceFactory,
    DeviceOptions, TelephonyDevice,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::mpsc;

#[derive(Default)]
struct ScriptedDevice {
    dialed: Mutex<Vec<String>>,
    destroyed: Mutex<usize>,
}

impl TelephonyDevice for ScriptedDevice {
    fn connect(&self, params: ConnectParams) -> Result<(), DeviceError> {
        self.dialed.lock().push(params.to);
        Ok(())
    }

    fn destroy(&self) {
        *self.destroyed.lock() += 1;
    }
}

#[derive(Default)]
struct ScriptedFactory {
    device: Arc<ScriptedDevice>,
    events: Mutex<Option<mpsc::UnboundedSender<DeviceEvent>>>,
}

impl DeviceFactory for ScriptedFactory {
    fn create(
        &self,
        token: &str,
        _options: DeviceOptions,
    ) -> Result<(Arc<dyn TelephonyDevice>, DeviceEvents), DeviceError> {
        if token != "valid-token" {
            return Err(DeviceError::InvalidToken);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *self.events.lock() = Some(tx);
        let device: Arc<dyn TelephonyDevice> = self.device.clone();
        Ok((device, rx))
    }
}

/// Capture whose chunks are pushed by the test
#[derive(Default)]
struct FedCapture {
    feeds: Mutex<Vec<mpsc::UnboundedSender<Vec<u8>>>>,
}

struct FedPipeline {
    mime_type: String,
}

impl CapturePipeline for FedPipeline {
    fn stop(&mut self) {}

    fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

impl CaptureBackend for FedCapture {
    fn open(
        &self,
        _stream: MediaStream,
        options: CaptureOptions,
    ) -> Result<(Box<dyn CapturePipeline>, ChunkReceiver), CaptureError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.feeds.lock().push(tx);
        let pipeline = FedPipeline {
            mime_type: options.mime_type,
        };
        Ok((Box::new(pipeline), rx))
    }

    fn silent_audio_track(&self) -> MediaTrack {
        MediaTrack::new("silence", TrackKind::Audio)
    }
}

struct Harness {
    factory: Arc<ScriptedFactory>,
    capture: Arc<FedCapture>,
    shutdown: Arc<ShutdownCoordinator>,
    exits: Arc<Mutex<Vec<i32>>>,
    launcher: InProcessLauncher,
}

impl Harness {
    fn new() -> Self {
        let factory = Arc::new(ScriptedFactory::default());
        let capture = Arc::new(FedCapture::default());
        let exits = Arc::new(Mutex::new(Vec::new()));
        let recorded = exits.clone();
        let shutdown = ShutdownCoordinator::new(move |code| recorded.lock().push(code));
        let launcher = InProcessLauncher::new(SandboxEnv {
            devices: factory.clone(),
            capture: capture.clone(),
        });
        Self {
            factory,
            capture,
            shutdown,
            exits,
            launcher,
        }
    }

    fn config(&self, output_dir: &Path, token: &str) -> HostConfig {
        HostConfig {
            target: "+15550100".to_string(),
            token: token.to_string(),
            port: 0,
            output_dir: output_dir.to_path_buf(),
            teardown_timeout: Duration::from_secs(2),
            bundle: PageBundle::default(),
        }
    }

    fn spawn(&self, config: HostConfig) -> tokio::task::JoinHandle<i32> {
        let launcher = self.launcher.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move { host::run(config, &launcher, shutdown).await })
    }

    async fn device_events(&self) -> mpsc::UnboundedSender<DeviceEvent> {
        loop {
            if let Some(events) = self.factory.events.lock().clone() {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn feed(&self, track: usize) -> mpsc::UnboundedSender<Vec<u8>> {
        loop {
            if let Some(feed) = self.capture.feeds.lock().get(track).cloned() {
                return feed;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

async fn wait_for_len(path: &Path, len: u64) {
    loop {
        if std::fs::metadata(path).map(|m| m.len()).unwrap_or(0) == len {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn connection() -> Connection {
    Connection::new("CA42", vec![MediaTrack::new("remote-0", TrackKind::Audio)])
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_call_is_recorded_and_shut_down_once() {
    let dir = tempdir().unwrap();
    // Left over from an earlier run
    std::fs::write(dir.path().join("0.ogg"), b"previous call").unwrap();
    let harness = Harness::new();
    let run = harness.spawn(harness.config(dir.path(), "valid-token"));

    let events = harness.device_events().await;
    events.send(DeviceEvent::Ready).unwrap();
    events.send(DeviceEvent::Connect(connection())).unwrap();

    let feed = harness.feed(0).await;
    wait_for_len(&dir.path().join("0.ogg"), 0).await;
    for byte in [1u8, 2, 3] {
        feed.send(vec![byte; 100]).unwrap();
        feed.send(Vec::new()).unwrap();
    }
    let recording = dir.path().join("0.ogg");
    tokio::time::timeout(Duration::from_secs(10), wait_for_len(&recording, 300))
        .await
        .unwrap();

    events.send(DeviceEvent::Disconnect(connection())).unwrap();
    let code = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(code, 0);
    assert_eq!(*harness.exits.lock(), vec![0]);
    assert_eq!(harness.shutdown.state(), ShutdownState::Stopped);
    assert_eq!(*harness.factory.device.dialed.lock(), vec!["+15550100".to_string()]);
    assert_eq!(*harness.factory.device.destroyed.lock(), 1);

    let contents = std::fs::read(&recording).unwrap();
    assert_eq!(contents, [vec![1u8; 100], vec![2; 100], vec![3; 100]].concat());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_signal_during_call_closes_page() {
    let dir = tempdir().unwrap();
    let harness = Harness::new();
    let run = harness.spawn(harness.config(dir.path(), "valid-token"));

    let events = harness.device_events().await;
    events.send(DeviceEvent::Ready).unwrap();
    events.send(DeviceEvent::Connect(connection())).unwrap();
    harness.feed(0).await;

    assert!(harness.shutdown.trigger(ShutdownCause::Signal("SIGUSR2")));
    assert!(!harness.shutdown.trigger(ShutdownCause::Signal("SIGINT")));
    let code = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(code, 0);
    assert_eq!(*harness.exits.lock(), vec![0]);
    // The page's close() ran before the sandbox was disposed of
    assert_eq!(*harness.factory.device.destroyed.lock(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_start_exits_with_one() {
    let dir = tempdir().unwrap();
    let harness = Harness::new();

    let code = tokio::time::timeout(
        Duration::from_secs(10),
        harness.spawn(harness.config(dir.path(), "expired-token")),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(code, 1);
    assert_eq!(*harness.exits.lock(), vec![1]);
    assert!(harness.factory.events.lock().is_none());
}
