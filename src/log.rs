//! Logging setup for conductor.
//!
//! Library code logs through `tracing` macros. Binaries embedding the crate
//! call [`init`] once to install a subscriber that writes to
//! `~/.conductor/conductor.log`.
//!
//! Levels:
//! - ERROR: failures that abort an operation
//! - WARN: recoverable surprises (task failures, sink errors)
//! - INFO: run milestones (session start, lifecycle transitions, report)
//! - DEBUG: scheduling decisions and per-task dispatch
//! - TRACE: very detailed traces
//!
//! Debug mode can be enabled with `CONDUCTOR_DEBUG=1`. `RUST_LOG` takes
//! precedence over both defaults when set.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

/// Environment variable that switches on debug logging.
pub const DEBUG_ENV: &str = "CONDUCTOR_DEBUG";

const LOG_FILE: &str = "conductor.log";

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialize logging to ~/.conductor/conductor.log
pub fn init() {
    init_with_debug(false);
}

/// Initialize logging with explicit debug mode setting.
///
/// Falls back to stderr when the home directory is unavailable. Calling
/// this more than once is harmless; only the first subscriber is kept.
pub fn init_with_debug(debug: bool) {
    let debug_enabled = debug || debug_from_env(std::env::var(DEBUG_ENV).ok().as_deref());
    DEBUG_ENABLED.store(debug_enabled, Ordering::SeqCst);

    let filter = build_filter(std::env::var("RUST_LOG").ok().as_deref(), debug_enabled);

    match log_path() {
        Some(path) => {
            let dir = path.parent().map(PathBuf::from).unwrap_or_default();
            let _ = std::fs::create_dir_all(&dir);
            // Truncate file on startup
            let _ = std::fs::write(&path, "");
            let appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = LOG_GUARD.set(guard);
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr).compact())
                .try_init();
        }
    }
}

/// Check if debug mode is enabled.
pub fn is_debug() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

/// Path of the log file, if a home directory exists.
pub fn log_path() -> Option<PathBuf> {
    Config::conductor_dir().ok().map(|dir| dir.join(LOG_FILE))
}

fn debug_from_env(value: Option<&str>) -> bool {
    value
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn default_directive(debug: bool) -> &'static str {
    if debug {
        "debug"
    } else {
        "info"
    }
}

fn build_filter(rust_log: Option<&str>, debug: bool) -> EnvFilter {
    rust_log
        .filter(|v| !v.trim().is_empty())
        .and_then(|v| EnvFilter::try_new(v).ok())
        .unwrap_or_else(|| EnvFilter::new(default_directive(debug)))
}
