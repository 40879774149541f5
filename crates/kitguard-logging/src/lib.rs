//! # kitguard-logging
//!
//! Logging for the kitguard safety layer.
//!
//! Two concerns live here: process-wide `tracing` setup for diagnostics, and
//! the audit trail of safety-relevant events (checkpoints taken, rollbacks,
//! diffs applied or refused).
//!
//! ## Key Types
//!
//! - [`Logger`] - Audit event sink (console and/or JSON lines file)
//! - [`LogEvent`] - Audit event types
//! - [`LogFormat`] - Console formats (Pretty, JSON, Compact, Silent)

mod events;

pub use events::{LogEvent, LogFormat, Logger};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing for the application.
///
/// Diagnostics always go to stderr so stdout stays free for tool results.
pub fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .try_init();
        }
        LogFormat::Pretty | LogFormat::Compact | LogFormat::Silent => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
                .try_init();
        }
    }
}
