use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TelemetryError};

/// Access-pattern categories exercised by the tester. Samples carrying any
/// other mode stay in history but never enter a statistics window.
pub const MODES: [u8; 5] = [1, 2, 3, 4, 5];

pub const FRACTION_MIN: f64 = 0.1;
pub const FRACTION_MAX: f64 = 0.9;

/// One parsed telemetry record, one per benchmark chunk. Field renames pin
/// the wire keys the dashboard protocol uses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub chunk: u64,
    pub mode: u8,
    #[serde(rename = "ms")]
    pub elapsed_ms: f64,
    #[serde(rename = "gbps")]
    pub bandwidth_gbps: f64,
    pub new_errors: u64,
    pub total_errors: u64,
}

/// Per-mode population standard deviation over the rolling windows, plus
/// the mean across the modes present. Modes with fewer than two recorded
/// values are absent from the map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub per_mode_std: BTreeMap<u8, f64>,
    pub avg_std: f64,
}

/// Parameters handed to the tester at spawn time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub fraction: f64,
    pub chunk_iters: u32,
}

impl RuntimeConfig {
    pub fn new(fraction: f64, chunk_iters: u32) -> Result<Self> {
        let mut config = Self {
            fraction: FRACTION_MIN,
            chunk_iters: 1,
        };
        config.set_fraction(fraction)?;
        config.set_chunk_iters(chunk_iters)?;
        Ok(config)
    }

    pub fn set_fraction(&mut self, fraction: f64) -> Result<()> {
        if !(FRACTION_MIN..=FRACTION_MAX).contains(&fraction) {
            return Err(TelemetryError::FractionOutOfRange(fraction));
        }
        self.fraction = fraction;
        Ok(())
    }

    pub fn set_chunk_iters(&mut self, chunk_iters: u32) -> Result<()> {
        if chunk_iters == 0 {
            return Err(TelemetryError::ZeroIterations);
        }
        self.chunk_iters = chunk_iters;
        Ok(())
    }

    /// Positional arguments in the order the tester expects them. The
    /// fraction is always formatted with two decimals.
    pub fn spawn_args(&self) -> [String; 2] {
        [format!("{:.2}", self.fraction), self.chunk_iters.to_string()]
    }
}
