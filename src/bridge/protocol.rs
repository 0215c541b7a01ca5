//! Wire protocol between the host and the sandbox.
//!
//! Host → sandbox: [`HostMessage`]. Sandbox → host: [`SandboxMessage`].
//! Each message is one JSON line (see `transport`).

use crate::capture::DEFAULT_TIMESLICE;
use crate::telephony::Codec;
use serde::{Deserialize, Serialize};

/// Entry point that starts the call
pub const ENTRY_MAIN: &str = "main";

/// Entry point that runs the page's local teardown
pub const ENTRY_CLOSE: &str = "close";

/// Commands the host sends into the sandbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum HostMessage {
    /// Load the page served at `url`
    Navigate { id: u64, url: String },

    /// Invoke the named entry point with string arguments
    Evaluate {
        id: u64,
        entry: String,
        args: Vec<String>,
    },
}

impl HostMessage {
    pub fn id(&self) -> u64 {
        match self {
            HostMessage::Navigate { id, .. } | HostMessage::Evaluate { id, .. } => *id,
        }
    }
}

/// Messages the sandbox sends to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SandboxMessage {
    /// Call to one of the host-exposed functions
    Invoke { call: HostCall },

    /// A `HostMessage` with this id was started (or failed to start)
    Completed {
        id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// Host-exposed functions, serialized as `{"function": name, "args": [...]}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "function", content = "args", rename_all = "camelCase")]
pub enum HostCall {
    CloseBrowser,
    Debug(String),
    Info(String),
    Error(String),
    /// Path segments, last one is the file name
    CreateRecording(Vec<String>),
    /// Path segments and the transcoded chunk (see `codec`)
    AppendRecording(Vec<String>, String),
}

/// Settings the page picks up from `/bundle.js`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageBundle {
    pub codec_preferences: Vec<Codec>,
    #[serde(rename = "fakeLocalDTMF")]
    pub fake_local_dtmf: bool,
    /// Interval between recorder chunks, in milliseconds
    pub timeslice_ms: u64,
}

impl Default for PageBundle {
    fn default() -> Self {
        Self {
            codec_preferences: vec![Codec::Opus, Codec::Pcmu],
            fake_local_dtmf: false,
            timeslice_ms: DEFAULT_TIMESLICE.as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_host_call_wire_shape() {
        let call = HostCall::AppendRecording(vec!["0.ogg".to_string()], "\u{0}\u{ff}".to_string());
        let value = serde_json::to_value(SandboxMessage::Invoke { call }).unwrap();
        assert_eq!(
            value,
            json!({
                "kind": "invoke",
                "call": {"function": "appendRecording", "args": [["0.ogg"], "\u{0}\u{ff}"]}
            })
        );
    }

    #[test]
    fn test_close_browser_has_no_args() {
        let parsed: SandboxMessage =
            serde_json::from_str(r#"{"kind":"invoke","call":{"function":"closeBrowser"}}"#).unwrap();
        assert_eq!(
            parsed,
            SandboxMessage::Invoke {
                call: HostCall::CloseBrowser
            }
        );
    }

    #[test]
    fn test_completed_error_is_optional() {
        let ok: SandboxMessage = serde_json::from_str(r#"{"kind":"completed","id":3}"#).unwrap();
        assert_eq!(ok, SandboxMessage::Completed { id: 3, error: None });

        let text = serde_json::to_string(&SandboxMessage::Completed { id: 3, error: None }).unwrap();
        assert_eq!(text, r#"{"kind":"completed","id":3}"#);
    }

    #[test]
    fn test_evaluate_shape() {
        let message = HostMessage::Evaluate {
            id: 1,
            entry: ENTRY_MAIN.to_string(),
            args: vec!["token".to_string(), "+15550100".to_string()],
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({"kind": "evaluate", "id": 1, "entry": "main", "args": ["token", "+15550100"]})
        );
        assert_eq!(message.id(), 1);
    }

    #[test]
    fn test_default_bundle() {
        let value = serde_json::to_value(PageBundle::default()).unwrap();
        assert_eq!(
            value,
            json!({"codecPreferences": ["opus", "pcmu"], "fakeLocalDTMF": false, "timesliceMs": 100})
        );
    }
}
