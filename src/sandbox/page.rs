//! The page loaded inside the sandbox.
//!
//! Exposes the two entry points the host evaluates, `main(token, target)` and
//! `close()`, and owns the call session started by `main`.

use super::call::{CallOutcome, CallSession};
use crate::bridge::protocol::{ENTRY_CLOSE, ENTRY_MAIN};
use crate::bridge::{PageBundle, SandboxBridge};
use crate::capture::CaptureBackend;
use crate::telephony::{DeviceError, DeviceFactory, DeviceOptions};
use crate::utils::logging::render_error;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Page errors, reported back to the host as the outcome of a request
#[derive(Error, Debug)]
pub enum PageError {
    #[error("{0} is not defined")]
    UnknownEntry(String),

    #[error("{entry}() takes {expected} arguments but {actual} were given")]
    Arguments {
        entry: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("failed to load {url}: {message}")]
    Load { url: String, message: String },

    #[error("no page has been loaded")]
    NotLoaded,

    #[error("main() was already called")]
    AlreadyStarted,

    #[error("Device {0}")]
    Device(#[from] DeviceError),
}

/// Collaborators available to the page
#[derive(Clone)]
pub struct SandboxEnv {
    pub devices: Arc<dyn DeviceFactory>,
    pub capture: Arc<dyn CaptureBackend>,
}

pub struct Page {
    bridge: SandboxBridge,
    env: SandboxEnv,
    bundle: Mutex<Option<PageBundle>>,
    session: Mutex<Option<Arc<CallSession>>>,
    closing: Arc<AtomicBool>,
}

impl Page {
    pub fn new(bridge: SandboxBridge, env: SandboxEnv) -> Arc<Self> {
        Arc::new(Self {
            bridge,
            env,
            bundle: Mutex::new(None),
            session: Mutex::new(None),
            closing: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    pub fn session(&self) -> Option<Arc<CallSession>> {
        self.session.lock().clone()
    }

    /// Load the page at `url` and adopt the bundle it references
    pub async fn navigate(&self, url: &str) -> Result<(), PageError> {
        let base = url.trim_end_matches('/').to_string();
        let loaded = tokio::task::spawn_blocking(move || load(&base))
            .await
            .map_err(|e| PageError::Load {
                url: url.to_string(),
                message: e.to_string(),
            })??;
        *self.bundle.lock() = Some(loaded);
        Ok(())
    }

    /// Invoke an entry point. Returns once it has started.
    pub fn evaluate(self: &Arc<Self>, entry: &str, args: Vec<String>) -> Result<(), PageError> {
        match entry {
            ENTRY_MAIN => {
                let [token, target] =
                    <[String; 2]>::try_from(args).map_err(|args| PageError::Arguments {
                        entry: ENTRY_MAIN,
                        expected: 2,
                        actual: args.len(),
                    })?;
                self.main(&token, target)
            }
            ENTRY_CLOSE => {
                self.close();
                Ok(())
            }
            other => Err(PageError::UnknownEntry(other.to_string())),
        }
    }

    fn main(self: &Arc<Self>, token: &str, target: String) -> Result<(), PageError> {
        let bundle = self.bundle.lock().clone().ok_or(PageError::NotLoaded)?;
        if self.session.lock().is_some() {
            return Err(PageError::AlreadyStarted);
        }

        let options = DeviceOptions {
            codec_preferences: bundle.codec_preferences.clone(),
            fake_local_dtmf: bundle.fake_local_dtmf,
        };
        let (device, events) = self.env.devices.create(token, options)?;
        self.bridge.debug("Device is being created...");

        let session = CallSession::new(
            target,
            device,
            self.bridge.clone(),
            self.env.capture.clone(),
            Duration::from_millis(bundle.timeslice_ms),
            self.closing.clone(),
        );
        tracing::debug!("Call session {} started", session.id());
        *self.session.lock() = Some(session.clone());

        let running = tokio::spawn(session.run(events));
        let page = self.clone();
        tokio::spawn(async move {
            match running.await {
                Ok(CallOutcome::Disconnected) => page.close(),
                Ok(CallOutcome::EventsClosed) => page.bridge.debug("Device stopped sending events."),
                Err(e) => page.bridge.error(render_error(
                    &anyhow::Error::new(e).context("call session failed"),
                )),
            }
        });
        Ok(())
    }

    /// Stop recording, destroy the device and ask the host to close.
    /// Only the first call does anything.
    pub fn close(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(session) = self.session() {
            session.shutdown();
        }
        self.bridge.close_browser();
    }
}

fn load(base: &str) -> Result<PageBundle, PageError> {
    let page_url = format!("{base}/");
    let html = fetch(&page_url)?;
    if !html.contains("/bundle.js") {
        return Err(PageError::Load {
            url: page_url,
            message: "page does not load /bundle.js".to_string(),
        });
    }

    let bundle_url = format!("{base}/bundle.js");
    let body = fetch(&bundle_url)?;
    serde_json::from_str(&body).map_err(|e| PageError::Load {
        url: bundle_url,
        message: e.to_string(),
    })
}

fn fetch(url: &str) -> Result<String, PageError> {
    let failed = |message: String| PageError::Load {
        url: url.to_string(),
        message,
    };
    ureq::get(url)
        .call()
        .map_err(|e| failed(e.to_string()))?
        .into_string()
        .map_err(|e| failed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{HostCall, SandboxMessage};
    use crate::host::server::HttpServer;
    use crate::recorder::track::tests::ManualCapture;
    use crate::sandbox::call::tests::ScriptedDevice;
    use crate::telephony::{Codec, DeviceEvent, DeviceEvents, TelephonyDevice};
    use tokio::sync::mpsc;

    /// Hands out one scripted device and keeps its event sender
    #[derive(Default)]
    struct ScriptedFactory {
        device: Arc<ScriptedDevice>,
        events: Mutex<Option<mpsc::UnboundedSender<DeviceEvent>>>,
        options: Mutex<Option<DeviceOptions>>,
    }

    impl DeviceFactory for ScriptedFactory {
        fn create(
            &self,
            token: &str,
            options: DeviceOptions,
        ) -> Result<(Arc<dyn TelephonyDevice>, DeviceEvents), DeviceError> {
            if token.is_empty() {
                return Err(DeviceError::InvalidToken);
            }
            let (tx, rx) = mpsc::unbounded_channel();
            *self.events.lock() = Some(tx);
            *self.options.lock() = Some(options);
            let device: Arc<dyn TelephonyDevice> = self.device.clone();
            Ok((device, rx))
        }
    }

    fn page_with(factory: Arc<ScriptedFactory>) -> (Arc<Page>, mpsc::UnboundedReceiver<SandboxMessage>) {
        let (bridge, messages) = SandboxBridge::channel();
        let env = SandboxEnv {
            devices: factory,
            capture: Arc::new(ManualCapture::default()),
        };
        (Page::new(bridge, env), messages)
    }

    fn calls(messages: &mut mpsc::UnboundedReceiver<SandboxMessage>) -> Vec<HostCall> {
        let mut calls = Vec::new();
        while let Ok(message) = messages.try_recv() {
            if let SandboxMessage::Invoke { call } = message {
                calls.push(call);
            }
        }
        calls
    }

    #[tokio::test]
    async fn test_unknown_entry_and_bad_arguments() {
        let (page, _messages) = page_with(Arc::new(ScriptedFactory::default()));

        let err = page.evaluate("dial", vec![]).unwrap_err();
        assert_eq!(err.to_string(), "dial is not defined");

        let err = page.evaluate(ENTRY_MAIN, vec!["token".into()]).unwrap_err();
        assert!(matches!(err, PageError::Arguments { actual: 1, .. }));

        let err = page
            .evaluate(ENTRY_MAIN, vec!["token".into(), "+15550100".into()])
            .unwrap_err();
        assert!(matches!(err, PageError::NotLoaded));
    }

    #[tokio::test]
    async fn test_navigate_adopts_bundle_then_main_creates_device() {
        let bundle = PageBundle {
            codec_preferences: vec![Codec::Pcmu],
            fake_local_dtmf: true,
            timeslice_ms: 50,
        };
        let server = HttpServer::start(0, &bundle).await.unwrap();
        let factory = Arc::new(ScriptedFactory::default());
        let (page, mut messages) = page_with(factory.clone());

        page.navigate(&server.url()).await.unwrap();
        page.evaluate(ENTRY_MAIN, vec!["token".into(), "+15550100".into()])
            .unwrap();

        assert_eq!(
            *factory.options.lock(),
            Some(DeviceOptions {
                codec_preferences: vec![Codec::Pcmu],
                fake_local_dtmf: true,
            })
        );
        assert!(calls(&mut messages).contains(&HostCall::Debug("Device is being created...".into())));
        assert!(matches!(
            page.evaluate(ENTRY_MAIN, vec!["token".into(), "+15550100".into()]),
            Err(PageError::AlreadyStarted)
        ));
        server.close().await;
    }

    #[tokio::test]
    async fn test_navigate_failure_is_reported() {
        let (page, _messages) = page_with(Arc::new(ScriptedFactory::default()));
        // Nothing listens on port 1
        let err = page.navigate("http://127.0.0.1:1").await.unwrap_err();
        assert!(matches!(err, PageError::Load { .. }));
    }

    #[tokio::test]
    async fn test_disconnect_closes_page_once() {
        let server = HttpServer::start(0, &PageBundle::default()).await.unwrap();
        let factory = Arc::new(ScriptedFactory::default());
        let (page, mut messages) = page_with(factory.clone());
        page.navigate(&server.url()).await.unwrap();
        page.evaluate(ENTRY_MAIN, vec!["token".into(), "+15550100".into()])
            .unwrap();

        let events = factory.events.lock().clone().unwrap();
        let connection = crate::telephony::Connection::new("CA1", vec![]);
        events.send(DeviceEvent::Ready).unwrap();
        events.send(DeviceEvent::Connect(connection.clone())).unwrap();
        events.send(DeviceEvent::Disconnect(connection)).unwrap();

        while !page.is_closing() {
            tokio::task::yield_now().await;
        }
        // Host-initiated close after the fact changes nothing
        page.evaluate(ENTRY_CLOSE, vec![]).unwrap();
        page.close();

        let closes = calls(&mut messages)
            .into_iter()
            .filter(|call| *call == HostCall::CloseBrowser)
            .count();
        assert_eq!(closes, 1);
        assert_eq!(*factory.device.destroyed.lock(), 1);
        server.close().await;
    }
}
