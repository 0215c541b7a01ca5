//! Error types and handling
//!
//! Common error types used by the host process. Each module keeps its own
//! narrow error enum; `AppError` is what the host's startup and teardown code
//! deals in.

use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sandbox error: {0}")]
    Sandbox(String),

    #[error("HTTP server error: {0}")]
    Server(String),
}

impl AppError {
    /// Short stable code, prefixed to startup error log lines
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Sandbox(_) => "SANDBOX_ERROR",
            AppError::Server(_) => "SERVER_ERROR",
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_follow_variant() {
        let io = AppError::from(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert_eq!(io.code(), "IO_ERROR");
        assert_eq!(io.to_string(), "IO error: boom");

        let sandbox = AppError::Sandbox("exited".to_string());
        assert_eq!(sandbox.code(), "SANDBOX_ERROR");
        assert_eq!(sandbox.to_string(), "Sandbox error: exited");
    }
}
