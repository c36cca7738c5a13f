//! `tracing` subscriber set-up shared by both binaries.

use tracing_subscriber::{fmt, EnvFilter};

/// Where log lines go. The MCP stdio transport owns stdout, so the
/// tool server always logs to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    Stderr,
}

/// Initialise the `tracing` subscriber.
///
/// `RUST_LOG` overrides the filter; `COINWATCH_LOG_JSON` switches to
/// JSON lines.
pub fn init_logging(target: LogTarget) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("coinwatch=info"));

    let json_logging = std::env::var("COINWATCH_LOG_JSON").is_ok();

    let builder = fmt().with_env_filter(env_filter).with_target(true);

    match (json_logging, target) {
        (true, LogTarget::Stdout) => builder.json().with_thread_ids(true).init(),
        (true, LogTarget::Stderr) => builder
            .json()
            .with_thread_ids(true)
            .with_writer(std::io::stderr)
            .init(),
        (false, LogTarget::Stdout) => builder.init(),
        (false, LogTarget::Stderr) => builder.with_writer(std::io::stderr).with_ansi(false).init(),
    }
}
