use std::env;
use std::path::PathBuf;

use memwatch_telemetry::RuntimeConfig;
use serde::Serialize;

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Bind address (127.0.0.1 by default; the control surface is unauthenticated)
    pub bind_addr: String,
    /// Path to the GDDR tester executable
    pub tester_path: PathBuf,
    /// Initial tester parameters (fraction, iterations per chunk)
    pub runtime: RuntimeConfig,
    /// Rolling window size per mode
    pub window_capacity: usize,
    /// History ring size across all modes
    pub ring_capacity: usize,
    /// Whether supervision starts enabled at boot
    pub autostart: bool,
    /// Clock control through Afterburner profiles rather than an offset template
    pub profile_mode: bool,
    /// Afterburner executable used in profile mode
    pub afterburner_exe: PathBuf,
    /// Shell command template with an `{offset}` placeholder, used when
    /// profile mode is off
    pub offset_cmd_template: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let fraction = env::var("MEMWATCH_FRACTION")
            .unwrap_or_else(|_| "0.80".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("MEMWATCH_FRACTION must be a float".to_string()))?;
        let chunk_iters = env::var("MEMWATCH_CHUNK_ITERS")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::InvalidValue("MEMWATCH_CHUNK_ITERS must be an integer".to_string())
            })?;
        let runtime = RuntimeConfig::new(fraction, chunk_iters)
            .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        let window_capacity = env::var("MEMWATCH_WINDOW_CAPACITY")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .unwrap_or(60);
        let ring_capacity = env::var("MEMWATCH_RING_CAPACITY")
            .unwrap_or_else(|_| "800".to_string())
            .parse()
            .unwrap_or(800);
        if window_capacity == 0 || ring_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "window and ring capacities must be positive".to_string(),
            ));
        }

        Ok(Self {
            port: env::var("MEMWATCH_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            bind_addr: env::var("MEMWATCH_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string()),
            tester_path: env::var("MEMWATCH_TESTER_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./gddr7_tester")),
            runtime,
            window_capacity,
            ring_capacity,
            autostart: env::var("MEMWATCH_AUTOSTART")
                .map(|v| v.to_lowercase() == "true")
                .unwrap_or(true),
            profile_mode: env::var("MEMWATCH_PROFILE_MODE")
                .map(|v| v.to_lowercase() == "true")
                .unwrap_or(true),
            afterburner_exe: env::var("MEMWATCH_AFTERBURNER_EXE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    PathBuf::from(r"C:\Program Files (x86)\MSI Afterburner\MSIAfterburner.exe")
                }),
            offset_cmd_template: env::var("MEMWATCH_OFFSET_CMD_TEMPLATE").ok(),
        })
    }

    /// Get the full bind address (addr:port)
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    /// Range the dashboard slider may request, depending on the clock
    /// control mode: profile levels 0..=4, or clock offsets 0..=2000 MHz in
    /// steps of 50.
    pub fn slider_bounds(&self) -> SliderBounds {
        if self.profile_mode {
            SliderBounds {
                min: 0,
                max: 4,
                step: 1,
            }
        } else {
            SliderBounds {
                min: 0,
                max: 2000,
                step: 50,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct SliderBounds {
    pub min: i64,
    pub max: i64,
    pub step: i64,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port number")]
    InvalidPort,
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}
