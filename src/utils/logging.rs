//! Logging setup and helpers for rendering error chains.

use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "call_recorder=info,sandbox=info";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Where log lines go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    /// Used by the sandbox process, whose stdout carries the bridge
    Stderr,
}

/// Initialize tracing/logging
pub fn init(output: LogOutput) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_FILTER.into());
    let timer = ChronoLocal::new(TIMESTAMP_FORMAT.to_string());

    match output {
        LogOutput::Stdout => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_timer(timer))
            .init(),
        LogOutput::Stderr => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_timer(timer)
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

/// Indent every line of `text` by two spaces
pub fn indent(text: &str) -> String {
    text.split('\n')
        .map(|line| format!("  {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render an error and its cause chain as an indented block set off by blank lines
pub fn render_error(error: &anyhow::Error) -> String {
    format!("\n\n{}\n", indent(&format!("{error:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_indent_every_line() {
        assert_eq!(indent("a\nb"), "  a\n  b");
        assert_eq!(indent(""), "  ");
    }

    #[test]
    fn test_render_error_includes_chain() {
        let error = Err::<(), _>(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"))
            .context("appending chunk")
            .unwrap_err();

        let rendered = render_error(&error);

        assert!(rendered.starts_with("\n\n  appending chunk"));
        assert!(rendered.contains("disk gone"));
        assert!(rendered.ends_with('\n'));
    }
}
