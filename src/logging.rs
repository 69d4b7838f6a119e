//! Logging setup driven by environment variables.
//!
//! The facade emits `tracing` events on every call: `debug!` per operation
//! with `collection` and `operation` fields, `info!` on connect and close.
//! Applications that already install a subscriber need nothing from this
//! module.
//!
//! # Environment Variables
//!
//! - `MONGO_FACADE_DEBUG=true|1|yes` - Enable debug logging
//! - `MONGO_FACADE_LOG_LEVEL=trace|debug|info|warn|error` - Set a specific level
//! - `MONGO_FACADE_LOG_FORMAT=json|pretty|compact` - Output format (default: json)
//!
//! With the `tracing-subscriber` feature, [`init`] installs a global
//! subscriber filtered to this crate.
//!
//! ```rust,no_run
//! mongo_facade::logging::init();
//! ```

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

/// Enables debug logging when truthy.
pub const DEBUG_VAR: &str = "MONGO_FACADE_DEBUG";
/// Overrides the log level.
pub const LEVEL_VAR: &str = "MONGO_FACADE_LOG_LEVEL";
/// Selects the output format.
pub const FORMAT_VAR: &str = "MONGO_FACADE_LOG_FORMAT";

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Multi-line, human-oriented output.
    Pretty,
    /// Single-line output.
    Compact,
}

impl LogFormat {
    /// Parse a format name, falling back to [`LogFormat::Json`].
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::to_lowercase).as_deref() {
            Some("pretty") => Self::Pretty,
            Some("compact") => Self::Compact,
            _ => Self::Json,
        }
    }

    /// Name of the format.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
            Self::Compact => "compact",
        }
    }
}

fn truthy(value: Option<&str>) -> bool {
    value
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// Resolve a level name, defaulting to `debug` when debugging, else `warn`.
pub fn parse_level(value: Option<&str>, debug: bool) -> &'static str {
    let fallback = if debug { "debug" } else { "warn" };
    match value.map(str::to_lowercase).as_deref() {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("info") => "info",
        Some("warn") => "warn",
        Some("error") => "error",
        _ => fallback,
    }
}

/// Check if debug logging is enabled via `MONGO_FACADE_DEBUG`.
#[inline]
pub fn is_debug_enabled() -> bool {
    truthy(env::var(DEBUG_VAR).ok().as_deref())
}

/// Get the configured log level from `MONGO_FACADE_LOG_LEVEL`.
pub fn get_log_level() -> &'static str {
    parse_level(env::var(LEVEL_VAR).ok().as_deref(), is_debug_enabled())
}

/// Get the configured log format from `MONGO_FACADE_LOG_FORMAT`.
pub fn get_log_format() -> LogFormat {
    LogFormat::parse(env::var(FORMAT_VAR).ok().as_deref())
}

/// Install the logging subscriber.
///
/// Does nothing unless debugging or a level is requested. Subsequent calls
/// are no-ops.
pub fn init() {
    INIT.call_once(|| {
        if !is_debug_enabled() && env::var(LEVEL_VAR).is_err() {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let level = get_log_level();
            let format = get_log_format();
            let filter = EnvFilter::try_new(format!("mongo_facade={}", level))
                .unwrap_or_else(|_| EnvFilter::new("warn"));

            let registry = tracing_subscriber::registry().with(filter);
            let installed = match format {
                LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
                LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
                LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
            };

            if installed.is_ok() {
                tracing::info!(
                    level = level,
                    format = format.as_str(),
                    "mongo-facade logging initialized"
                );
            }
        }
    });
}

/// Initialize logging with a specific level.
///
/// # Safety
///
/// This function modifies environment variables, which is unsafe in
/// multi-threaded programs. Call it at startup before spawning threads.
pub fn init_with_level(level: &str) {
    // SAFETY: only called at program startup before threads are spawned.
    unsafe {
        env::set_var(LEVEL_VAR, level);
    }
    init();
}

/// Initialize debug logging; equivalent to `MONGO_FACADE_DEBUG=true` plus [`init`].
///
/// # Safety
///
/// Same constraints as [`init_with_level`].
pub fn init_debug() {
    // SAFETY: only called at program startup before threads are spawned.
    unsafe {
        env::set_var(DEBUG_VAR, "true");
    }
    init();
}
