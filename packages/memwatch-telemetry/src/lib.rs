//! Telemetry core for the GDDR tester monitor: line parsing, per-mode
//! rolling statistics, and a bounded sample history behind a single lock.

pub mod error;
pub mod history;
pub mod parser;
pub mod stats;
pub mod store;
pub mod types;

pub use error::{Result, TelemetryError};
pub use history::HistoryRing;
pub use parser::{parse_line, ParsedLine, FAULT_MARKER};
pub use stats::ModeWindows;
pub use store::TelemetryStore;
pub use types::{RuntimeConfig, Sample, StatsSnapshot, FRACTION_MAX, FRACTION_MIN, MODES};
