//! call-recorder - places a phone call from a sandboxed page and records every
//! inbound track to disk.
//!
//! The host ([`host`]) serves the page, launches the sandbox and persists the
//! chunks it receives. The sandbox ([`sandbox`]) drives the telephony device
//! and one recorder per track. The two only talk through [`bridge`].

pub mod bridge;
pub mod capture;
pub mod config;
pub mod host;
pub mod recorder;
pub mod sandbox;
pub mod telephony;
pub mod utils;
