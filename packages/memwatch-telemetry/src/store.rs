use parking_lot::RwLock;

use crate::history::HistoryRing;
use crate::stats::ModeWindows;
use crate::types::{Sample, StatsSnapshot};

/// Shared telemetry state. The statistics windows and the history ring sit
/// behind one lock so a reset is indivisible: no reader can observe some
/// windows cleared and others not, or a replay mixing pre- and post-reset
/// state.
#[derive(Debug)]
pub struct TelemetryStore {
    inner: RwLock<Inner>,
}

#[derive(Debug)]
struct Inner {
    windows: ModeWindows,
    ring: HistoryRing,
}

impl TelemetryStore {
    pub fn new(window_capacity: usize, ring_capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                windows: ModeWindows::new(window_capacity),
                ring: HistoryRing::new(ring_capacity),
            }),
        }
    }

    /// Ingests one sample: updates the mode window (known modes only),
    /// appends to history, and returns the statistics as of this sample.
    pub fn record(&self, sample: Sample) -> StatsSnapshot {
        let mut inner = self.inner.write();
        inner.windows.observe(sample.mode, sample.bandwidth_gbps);
        inner.ring.append(sample);
        inner.windows.snapshot()
    }

    /// Current statistics without mutating anything.
    pub fn snapshot(&self) -> StatsSnapshot {
        self.inner.read().windows.snapshot()
    }

    /// History contents in arrival order plus the current statistics, read
    /// in one step.
    pub fn replay(&self) -> (Vec<Sample>, StatsSnapshot) {
        let inner = self.inner.read();
        (inner.ring.to_vec(), inner.windows.snapshot())
    }

    /// Empties every statistics window; the history ring is untouched.
    pub fn reset_stats(&self) {
        self.inner.write().windows.reset();
    }

    /// Empties statistics and history together (restart semantics).
    pub fn clear_all(&self) {
        let mut inner = self.inner.write();
        inner.windows.reset();
        inner.ring.clear();
    }

    pub fn history_len(&self) -> usize {
        self.inner.read().ring.len()
    }
}
