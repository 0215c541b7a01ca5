//! Command line and environment configuration

use crate::bridge::PageBundle;
use crate::utils::error::{AppError, AppResult};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Call TARGET and record every inbound track
    Call(HostArgs),

    /// Run the page runtime on stdin/stdout (started by `call`)
    #[command(hide = true)]
    Sandbox(SandboxArgs),
}

#[derive(Args, Debug, Clone)]
pub struct HostArgs {
    /// Number or client address to call
    pub target: String,

    /// Telephony access token
    #[arg(long, env = "CALL_RECORDER_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Port for the page server
    #[arg(long, env = "CALL_RECORDER_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Directory recordings are written under
    #[arg(long, env = "CALL_RECORDER_OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Sandbox executable. Defaults to this binary.
    #[arg(long)]
    pub sandbox_program: Option<PathBuf>,

    /// How long to wait for the page's close() during shutdown
    #[arg(long, default_value_t = 5000)]
    pub teardown_timeout_ms: u64,

    #[command(flatten)]
    pub device: DeviceArgs,
}

#[derive(Args, Debug, Clone)]
pub struct SandboxArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
}

/// Settings of the simulated telephony device
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct DeviceArgs {
    /// Inbound audio tracks per call
    #[arg(long, default_value_t = 1)]
    pub simulated_tracks: usize,

    /// Seconds until the far end hangs up
    #[arg(long, default_value_t = 10)]
    pub simulated_call_secs: u64,
}

impl DeviceArgs {
    pub fn call_length(&self) -> Duration {
        Duration::from_secs(self.simulated_call_secs)
    }

    /// The same settings as command line arguments, for the sandbox process
    pub fn to_args(&self) -> Vec<String> {
        vec![
            "--simulated-tracks".to_string(),
            self.simulated_tracks.to_string(),
            "--simulated-call-secs".to_string(),
            self.simulated_call_secs.to_string(),
        ]
    }
}

/// Everything the host needs to run one call
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub target: String,
    pub token: String,
    pub port: u16,
    pub output_dir: PathBuf,
    pub teardown_timeout: Duration,
    pub bundle: PageBundle,
}

impl TryFrom<&HostArgs> for HostConfig {
    type Error = AppError;

    fn try_from(args: &HostArgs) -> AppResult<Self> {
        if args.target.trim().is_empty() {
            return Err(AppError::Config("call target is empty".to_string()));
        }
        if args.token.trim().is_empty() {
            return Err(AppError::Config("access token is empty".to_string()));
        }
        Ok(Self {
            target: args.target.clone(),
            token: args.token.clone(),
            port: args.port,
            output_dir: args.output_dir.clone(),
            teardown_timeout: Duration::from_millis(args.teardown_timeout_ms),
            bundle: PageBundle::default(),
        })
    }
}
