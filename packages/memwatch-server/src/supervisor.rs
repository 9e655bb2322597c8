use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use memwatch_telemetry::{parse_line, ParsedLine, RuntimeConfig, TelemetryStore};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::events::TelemetryEvent;
use crate::hub::Hub;

/// Poll interval while supervision is disabled.
const IDLE_POLL: Duration = Duration::from_millis(200);
/// Backoff after a missing executable or a failed spawn.
const SPAWN_BACKOFF: Duration = Duration::from_secs(2);
/// Pause after a process exit before re-evaluating the run flag.
const EXIT_DEBOUNCE: Duration = Duration::from_millis(500);
/// Bound on waiting for a terminated child to report its exit status.
const EXIT_WAIT: Duration = Duration::from_secs(5);
/// Depth of the line channel between the pipe pumps and the supervisor.
const LINE_BUFFER: usize = 256;

/// Lifecycle of the supervised tester process. Written only by the
/// supervising task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorState {
    Idle,
    Starting,
    Running,
    Exited,
}

/// Tester parameters shared between the control surface (writer) and the
/// supervising task, which reads them once per spawn.
pub type SharedRuntimeConfig = Arc<RwLock<RuntimeConfig>>;

/// Control-surface view of the supervising task.
#[derive(Clone)]
pub struct SupervisorHandle {
    run_enabled: Arc<watch::Sender<bool>>,
    current: Arc<Mutex<Option<Child>>>,
    state: Arc<RwLock<SupervisorState>>,
}

impl SupervisorHandle {
    pub fn run_enabled(&self) -> bool {
        *self.run_enabled.borrow()
    }

    /// Lets the supervising loop (re)spawn the tester.
    pub fn enable(&self) {
        let _ = self.run_enabled.send(true);
    }

    /// Stops supervision. A live process keeps running until terminated.
    pub fn disable(&self) {
        let _ = self.run_enabled.send(false);
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.read()
    }

    /// Requests graceful termination of the live process, if any. The
    /// supervising loop reaps it and reports the exit code.
    pub async fn terminate_current(&self) {
        let mut current = self.current.lock().await;
        if let Some(child) = current.as_mut() {
            terminate(child);
        }
    }
}

/// Owns the tester lifecycle: spawn, read combined output, publish
/// telemetry, reap, retry. The only writer of `SupervisorState` and the
/// only producer of samples.
pub struct Supervisor {
    tester_path: PathBuf,
    runtime: SharedRuntimeConfig,
    store: Arc<TelemetryStore>,
    hub: Hub,
    run_enabled: watch::Receiver<bool>,
    current: Arc<Mutex<Option<Child>>>,
    state: Arc<RwLock<SupervisorState>>,
}

impl Supervisor {
    /// Spawns the supervising task and returns the handle the control
    /// surface keeps.
    pub fn spawn(
        tester_path: PathBuf,
        autostart: bool,
        runtime: SharedRuntimeConfig,
        store: Arc<TelemetryStore>,
        hub: Hub,
    ) -> SupervisorHandle {
        let (tx, rx) = watch::channel(autostart);
        let current = Arc::new(Mutex::new(None));
        let state = Arc::new(RwLock::new(SupervisorState::Idle));
        let handle = SupervisorHandle {
            run_enabled: Arc::new(tx),
            current: Arc::clone(&current),
            state: Arc::clone(&state),
        };
        let supervisor = Self {
            tester_path,
            runtime,
            store,
            hub,
            run_enabled: rx,
            current,
            state,
        };
        tokio::spawn(supervisor.run());
        handle
    }

    async fn run(mut self) {
        loop {
            if !*self.run_enabled.borrow_and_update() {
                self.set_state(SupervisorState::Idle);
                sleep(IDLE_POLL).await;
                continue;
            }

            self.set_state(SupervisorState::Starting);
            if !self.tester_path.is_file() {
                self.hub.publish(&TelemetryEvent::status_error(format!(
                    "Tester not found: {}",
                    self.tester_path.display()
                )));
                sleep(SPAWN_BACKOFF).await;
                continue;
            }

            let runtime = *self.runtime.read();
            match self.spawn_tester(&runtime) {
                Ok((child, lines)) => {
                    self.supervise_run(child, lines).await;
                    sleep(EXIT_DEBOUNCE).await;
                }
                Err(e) => {
                    warn!(error = %e, "tester spawn failed");
                    self.hub.publish(&TelemetryEvent::status_error(format!(
                        "failed to start tester: {e}"
                    )));
                    sleep(SPAWN_BACKOFF).await;
                }
            }
        }
    }

    /// Starts the tester with the current parameters and wires both output
    /// pipes into one line channel.
    fn spawn_tester(
        &self,
        runtime: &RuntimeConfig,
    ) -> std::io::Result<(Child, mpsc::Receiver<String>)> {
        let [fraction, iters] = runtime.spawn_args();
        let mut child = Command::new(&self.tester_path)
            .arg(&fraction)
            .arg(&iters)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let (line_tx, line_rx) = mpsc::channel(LINE_BUFFER);
        if let Some(stdout) = child.stdout.take() {
            pump_lines(stdout, line_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            pump_lines(stderr, line_tx);
        }

        let command_line = format!("{} {} {}", self.tester_path.display(), fraction, iters);
        info!(command = %command_line, "tester spawned");
        self.hub.publish(&TelemetryEvent::status_text(format!(
            "tester started: {command_line}"
        )));
        Ok((child, line_rx))
    }

    /// Reads tester output until the pipes close or supervision stops,
    /// then reaps the process and reports its exit code.
    async fn supervise_run(&mut self, child: Child, mut lines: mpsc::Receiver<String>) {
        self.set_state(SupervisorState::Running);
        *self.current.lock().await = Some(child);

        let mut run_enabled = self.run_enabled.clone();
        loop {
            tokio::select! {
                biased;

                changed = run_enabled.changed() => {
                    if changed.is_err() || !*run_enabled.borrow_and_update() {
                        break;
                    }
                }
                line = lines.recv() => {
                    match line {
                        Some(line) => self.ingest(&line),
                        // Both pipes closed: the process is exiting.
                        None => break,
                    }
                }
            }
        }
        drop(lines);

        let code = self.reap().await;
        self.set_state(SupervisorState::Exited);
        info!(code, "tester exited");
        self.hub.publish(&TelemetryEvent::status_text(format!(
            "tester exited with code {code}"
        )));
    }

    fn ingest(&self, line: &str) {
        match parse_line(line) {
            ParsedLine::Sample(sample) => {
                // Record and deliver as one step so an attaching subscriber
                // cannot see this sample both replayed and live.
                self.hub.publish_with(|| {
                    let stats = self.store.record(sample);
                    TelemetryEvent::sample(sample, stats)
                });
            }
            ParsedLine::Fault(text) => {
                warn!(%text, "fault marker in tester output");
                self.hub.publish(&TelemetryEvent::status_error(text));
            }
            ParsedLine::Ignored => {}
        }
    }

    /// Terminates the child if it is still live and waits, bounded, for an
    /// exit code; -1 when none can be obtained.
    async fn reap(&self) -> i32 {
        let child = self.current.lock().await.take();
        let Some(mut child) = child else { return -1 };

        terminate(&mut child);
        match timeout(EXIT_WAIT, child.wait()).await {
            Ok(Ok(status)) => exit_code(status),
            Ok(Err(e)) => {
                warn!(error = %e, "failed to reap tester");
                -1
            }
            Err(_) => {
                debug!("tester ignored termination, killing");
                let _ = child.kill().await;
                match child.try_wait() {
                    Ok(Some(status)) => exit_code(status),
                    _ => -1,
                }
            }
        }
    }

    fn set_state(&self, state: SupervisorState) {
        *self.state.write() = state;
    }
}

/// Asks the process to stop: SIGTERM on Unix so the tester can wind down,
/// a hard kill where signals are unavailable. Reaping stays with the
/// supervising loop.
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
        return;
    }
    let _ = child.start_kill();
}

fn exit_code(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

/// Pumps one output pipe into the shared line channel. The tester's output
/// is not guaranteed to be UTF-8, so lines are read as bytes and decoded
/// lossily; a binary banner comes through as a no-match line instead of
/// ending the pump. Ends on EOF, on a read error, or once the supervisor
/// stops listening.
fn pump_lines<R>(pipe: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                        if buf.last() == Some(&b'\r') {
                            buf.pop();
                        }
                    }
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "tester output pipe error");
                    break;
                }
            }
        }
    });
}
