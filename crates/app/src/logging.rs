use std::str::FromStr;

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::state::AppConfig;
use crate::version::build_info;

/// Used when no state directory exists yet or its level does not parse
const DEFAULT_LEVEL: tracing::Level = tracing::Level::WARN;

fn level(config: Option<&AppConfig>) -> tracing::Level {
    config
        .and_then(|c| tracing::Level::from_str(&c.log_level).ok())
        .unwrap_or(DEFAULT_LEVEL)
}

/// Initialize logging and the panic logger.
///
/// Logs go to stderr so command output on stdout stays parseable. The
/// returned guards flush the writers and must live until exit.
pub fn init_logging(config: Option<&AppConfig>) -> Vec<tracing_appender::non_blocking::WorkerGuard> {
    let level = level(config);
    let mut guards = Vec::new();

    let (stderr_writer, stderr_guard) = tracing_appender::non_blocking(std::io::stderr());
    guards.push(stderr_guard);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stderr_writer)
        .with_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        );

    match config.and_then(|c| c.log_dir.as_ref()) {
        Some(log_dir) => {
            if let Err(e) = std::fs::create_dir_all(log_dir) {
                eprintln!("Warning: Failed to create log directory {:?}: {}", log_dir, e);
            }
            let file_appender = tracing_appender::rolling::daily(log_dir, "ddh.log");
            let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
            guards.push(file_guard);

            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_span_events(FmtSpan::CLOSE)
                .with_filter(
                    EnvFilter::builder()
                        .with_default_directive(level.into())
                        .from_env_lossy(),
                );

            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(file_layer)
                .init();
        }
        None => tracing_subscriber::registry().with(stderr_layer).init(),
    }

    register_panic_logger();
    let build = build_info();
    tracing::debug!(
        version = build.version,
        repo_version = build.repo_version,
        profile = build.build_profile,
        "ddh starting"
    );

    guards
}

/// Registers a panic hook that logs panics using the `tracing` crate
fn register_panic_logger() {
    std::panic::set_hook(Box::new(|panic| match panic.location() {
        Some(loc) => {
            tracing::error!(
                message = %panic,
                panic.file = loc.file(),
                panic.line = loc.line(),
                panic.column = loc.column(),
            );
        }
        None => tracing::error!(message = %panic),
    }));
}
