//! Log routing.
//!
//! Everything the control plane reports (and everything participants forward
//! through the log sink) becomes a [`LogEvent`]. Events are mirrored to
//! `tracing` and handed to the single registered [`EventMonitor`] of the
//! owning system when they pass its severity filter.

mod system_logger;

pub use system_logger::{LogSinkService, SystemLogger, LOG_SINK_CLIENT_SERVICE};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable controlling the `tracing` filter.
pub const LOG_ENV_VAR: &str = "SIMFLEET_LOG";

/// Severity of a log event, least verbose first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Off = 0,
    Fatal = 1,
    Error = 2,
    Warning = 3,
    #[default]
    Info = 4,
    Debug = 5,
}

impl Severity {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Severity::Off),
            1 => Some(Severity::Fatal),
            2 => Some(Severity::Error),
            3 => Some(Severity::Warning),
            4 => Some(Severity::Info),
            5 => Some(Severity::Debug),
            _ => None,
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Whether an event of `event` severity passes a filter set to `self`.
    pub fn allows(self, event: Severity) -> bool {
        self != Severity::Off && event != Severity::Off && event <= self
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Severity::Off => "off",
            Severity::Fatal => "fatal",
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
            Severity::Debug => "debug",
        };
        f.write_str(name)
    }
}

/// One log message delivered to a monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    /// Originating participant, empty for control-plane messages.
    pub participant_name: String,
    pub logger_name: String,
    pub message: String,
}

/// Receiver of a system's log events.
///
/// Called synchronously from whichever task produced the event; the monitor
/// may log again from inside the callback.
pub trait EventMonitor: Send + Sync {
    fn on_log(&self, event: &LogEvent);
}

/// Initialize tracing with the `SIMFLEET_LOG` environment variable.
///
/// Defaults to "info" if the variable is not set. Returns false if a global
/// subscriber was already installed.
pub fn init_tracing() -> bool {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
