use std::collections::{BTreeMap, VecDeque};

use crate::types::{StatsSnapshot, MODES};

/// Rolling bandwidth windows, one per mode in the fixed domain. Capacity is
/// shared by all windows; the oldest value falls out first.
#[derive(Debug, Clone)]
pub struct ModeWindows {
    capacity: usize,
    windows: BTreeMap<u8, VecDeque<f64>>,
}

impl ModeWindows {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            windows: empty_windows(),
        }
    }

    /// Records one bandwidth reading. Modes outside the fixed domain are
    /// ignored here; callers still keep such samples in history. Windows of
    /// capacity zero record nothing.
    pub fn observe(&mut self, mode: u8, gbps: f64) {
        if self.capacity == 0 {
            return;
        }
        if let Some(window) = self.windows.get_mut(&mode) {
            if window.len() >= self.capacity {
                window.pop_front();
            }
            window.push_back(gbps);
        }
    }

    /// Population standard deviation per mode, excluding windows with fewer
    /// than two values, plus the mean of the included deviations (0.0 when
    /// nothing qualifies).
    pub fn snapshot(&self) -> StatsSnapshot {
        let mut per_mode_std = BTreeMap::new();
        for (&mode, window) in &self.windows {
            if window.len() > 1 {
                per_mode_std.insert(mode, population_std(window));
            }
        }
        let avg_std = if per_mode_std.is_empty() {
            0.0
        } else {
            per_mode_std.values().sum::<f64>() / per_mode_std.len() as f64
        };
        StatsSnapshot {
            per_mode_std,
            avg_std,
        }
    }

    /// Replaces every window with an empty one in a single assignment, so a
    /// caller holding the enclosing lock exposes no half-reset state.
    pub fn reset(&mut self) {
        self.windows = empty_windows();
    }

    pub fn window_len(&self, mode: u8) -> usize {
        self.windows.get(&mode).map_or(0, VecDeque::len)
    }
}

fn empty_windows() -> BTreeMap<u8, VecDeque<f64>> {
    MODES.iter().map(|&mode| (mode, VecDeque::new())).collect()
}

fn population_std(values: &VecDeque<f64>) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values
        .iter()
        .map(|v| {
            let d = v - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    variance.sqrt()
}
