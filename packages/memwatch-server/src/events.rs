use memwatch_telemetry::{Sample, StatsSnapshot};
use serde::Serialize;

/// Events fanned out to every live dashboard connection. Internally tagged
/// so clients can switch on `type`. Serialize-only: the server produces
/// this stream, nothing parses it back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// One parsed tester sample together with the statistics as of that
    /// sample; both flatten into the top-level object.
    Sample {
        #[serde(flatten)]
        sample: Sample,
        #[serde(flatten)]
        stats: StatsSnapshot,
    },
    /// Operator-facing notification; exactly one of `text` or `error` is
    /// present.
    Status {
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl TelemetryEvent {
    pub fn sample(sample: Sample, stats: StatsSnapshot) -> Self {
        Self::Sample { sample, stats }
    }

    pub fn status_text(text: impl Into<String>) -> Self {
        Self::Status {
            text: Some(text.into()),
            error: None,
        }
    }

    pub fn status_error(error: impl Into<String>) -> Self {
        Self::Status {
            text: None,
            error: Some(error.into()),
        }
    }
}
