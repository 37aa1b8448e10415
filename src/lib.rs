//! simfleet - control plane for distributed simulation participants
//!
//! Groups remote participants into named systems, drives them through their
//! state machines in priority order, pushes configuration and timing to
//! them and forwards their logs to a single monitor. Participants are
//! reached through transport plugins; connections are shared per system
//! name and discovery URL.

pub mod config;
pub mod connection;
pub mod logging;
pub mod participant;
pub mod plugin;
pub mod rpc;
pub mod state;
pub mod system;
pub mod test_utils;
pub mod transport;

pub use config::SimfleetConfig;
pub use connection::{Connection, ConnectionFactory};
pub use logging::{init_tracing, EventMonitor, LogEvent, Severity};
pub use participant::ParticipantProxy;
pub use state::{ParticipantState, SystemState};
pub use system::{System, SystemError};
