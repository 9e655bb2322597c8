use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TelemetryError {
    #[error("memory fraction {0} outside supported range 0.1..=0.9")]
    FractionOutOfRange(f64),

    #[error("iterations per chunk must be positive")]
    ZeroIterations,
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
