use std::sync::Arc;

use chrono::{DateTime, Utc};
use memwatch_telemetry::{RuntimeConfig, TelemetryStore};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::clock::{ClockControl, ShellClockControl};
use crate::config::ServerConfig;
use crate::events::TelemetryEvent;
use crate::hub::Hub;
use crate::supervisor::{SharedRuntimeConfig, Supervisor, SupervisorHandle};

/// Headroom in each subscriber queue beyond a full history replay.
const SUBSCRIBER_SLACK: usize = 64;

/// Everything the handlers and the supervisor share, constructed once at
/// startup. Cloning shares handles.
#[derive(Clone)]
pub struct AppState {
    config: Arc<ServerConfig>,
    runtime: SharedRuntimeConfig,
    store: Arc<TelemetryStore>,
    hub: Hub,
    supervisor: SupervisorHandle,
    clock: Arc<dyn ClockControl>,
    started_at: DateTime<Utc>,
}

impl AppState {
    /// Builds the full service and spawns the supervising task. Must run
    /// inside the tokio runtime.
    pub fn new(config: ServerConfig) -> Self {
        let clock = Arc::new(ShellClockControl::from_config(&config));
        Self::with_clock(config, clock)
    }

    /// Same as [`AppState::new`] but with the clock-control seam
    /// substituted; tests inject a recorder here.
    pub fn with_clock(config: ServerConfig, clock: Arc<dyn ClockControl>) -> Self {
        let store = Arc::new(TelemetryStore::new(
            config.window_capacity,
            config.ring_capacity,
        ));
        let hub = Hub::new(config.ring_capacity + SUBSCRIBER_SLACK);
        let runtime: SharedRuntimeConfig = Arc::new(RwLock::new(config.runtime));
        let supervisor = Supervisor::spawn(
            config.tester_path.clone(),
            config.autostart,
            Arc::clone(&runtime),
            Arc::clone(&store),
            hub.clone(),
        );
        Self {
            config: Arc::new(config),
            runtime,
            store,
            hub,
            supervisor,
            clock,
            started_at: Utc::now(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Effective tester parameters right now.
    pub fn runtime(&self) -> RuntimeConfig {
        *self.runtime.read()
    }

    /// Applies valid overrides to the runtime parameters; out-of-range or
    /// absent values leave the previous setting in place. Returns the
    /// effective parameters.
    pub fn apply_overrides(&self, fraction: Option<f64>, iters: Option<u32>) -> RuntimeConfig {
        let mut runtime = self.runtime.write();
        if let Some(fraction) = fraction {
            let _ = runtime.set_fraction(fraction);
        }
        if let Some(iters) = iters {
            let _ = runtime.set_chunk_iters(iters);
        }
        *runtime
    }

    pub fn store(&self) -> &TelemetryStore {
        &self.store
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn supervisor(&self) -> &SupervisorHandle {
        &self.supervisor
    }

    pub fn clock(&self) -> &dyn ClockControl {
        self.clock.as_ref()
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }

    /// Registers a dashboard connection: the whole history ring, each
    /// sample paired with the current statistics, is queued before any
    /// live event can reach the new subscriber.
    pub fn attach_subscriber(&self) -> (Uuid, mpsc::Receiver<TelemetryEvent>) {
        self.hub.subscribe_with(|| {
            let (samples, stats) = self.store.replay();
            samples
                .into_iter()
                .map(|sample| TelemetryEvent::sample(sample, stats.clone()))
                .collect()
        })
    }
}
