//! Bridge between the host process and the sandbox
//!
//! - `codec`: byte-preserving transcoding of chunk payloads
//! - `protocol` / `transport`: messages and their JSONL framing
//! - `host`: the host's endpoint (evaluate, navigate, call dispatch)
//! - `commands`: the functions the host exposes to the sandbox
//! - `sandbox`: the sandbox's endpoint

pub mod codec;
pub mod commands;
pub mod host;
pub mod protocol;
pub mod sandbox;
pub mod transport;

pub use codec::CodecError;
pub use commands::ExposedFunctions;
pub use host::{BridgeError, BridgeHost, HostFunctions};
pub use protocol::{HostCall, HostMessage, PageBundle, SandboxMessage};
pub use sandbox::SandboxBridge;
pub use transport::{FrameReader, FrameWriter, TransportError};
