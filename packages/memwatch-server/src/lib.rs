//! Telemetry server for the GDDR tester: supervises the benchmark process,
//! turns its output into typed samples and rolling statistics, and streams
//! both to WebSocket dashboards with history replay.

pub mod clock;
pub mod config;
pub mod events;
pub mod handlers;
pub mod hub;
pub mod router;
pub mod state;
pub mod supervisor;
pub mod websocket;

pub use config::{ConfigError, ServerConfig};
pub use events::TelemetryEvent;
pub use hub::Hub;
pub use router::build_router;
pub use state::AppState;
pub use supervisor::{Supervisor, SupervisorHandle, SupervisorState};
