use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::info;

use crate::config::ServerConfig;

/// Bound on one clock-control command invocation.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Afterburner profile slots addressed by dashboard levels 0..=4.
const PROFILE_MAP: [(i64, u8); 5] = [(0, 1), (1, 2), (2, 3), (3, 4), (4, 5)];

/// Preconditions that fail before any command runs. The control surface
/// maps these to HTTP 400.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApplyError {
    #[error("level {0} not mapped")]
    UnmappedLevel(i64),
    #[error("Afterburner not found: {0}")]
    MissingExecutable(String),
    #[error("MEMWATCH_OFFSET_CMD_TEMPLATE not configured")]
    TemplateUnset,
}

/// Result of running the clock command. `ok` reflects the exit status; the
/// exact command line is echoed back; `output` carries combined
/// stdout+stderr or the timeout notice.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOutcome {
    pub ok: bool,
    pub command: String,
    pub output: String,
    /// Short label for status events: "Profile3" or "Offset 500".
    pub description: String,
}

/// Seam for the hardware parameter change. Production shells out; tests
/// substitute a recorder.
#[async_trait]
pub trait ClockControl: Send + Sync {
    async fn apply(&self, selector: i64) -> Result<ApplyOutcome, ApplyError>;
}

/// How the selector turns into a command line.
#[derive(Debug, Clone)]
pub enum ClockMode {
    /// `"<exe>" -Profile<N>` with levels mapped through `PROFILE_MAP`.
    Profile { exe: PathBuf },
    /// A shell template with an `{offset}` placeholder; `None` means the
    /// deployment never configured offset control.
    OffsetTemplate { template: Option<String> },
}

/// Applies the selector through an external command run by the platform
/// shell.
pub struct ShellClockControl {
    mode: ClockMode,
}

impl ShellClockControl {
    pub fn from_config(config: &ServerConfig) -> Self {
        let mode = if config.profile_mode {
            ClockMode::Profile {
                exe: config.afterburner_exe.clone(),
            }
        } else {
            ClockMode::OffsetTemplate {
                template: config.offset_cmd_template.clone(),
            }
        };
        Self { mode }
    }

    pub fn new(mode: ClockMode) -> Self {
        Self { mode }
    }

    /// Resolves the selector to (command line, label) without running
    /// anything.
    fn resolve(&self, selector: i64) -> Result<(String, String), ApplyError> {
        match &self.mode {
            ClockMode::Profile { exe } => {
                let profile = PROFILE_MAP
                    .iter()
                    .find(|(level, _)| *level == selector)
                    .map(|(_, profile)| *profile)
                    .ok_or(ApplyError::UnmappedLevel(selector))?;
                if !exe.is_file() {
                    return Err(ApplyError::MissingExecutable(exe.display().to_string()));
                }
                Ok((
                    format!("\"{}\" -Profile{}", exe.display(), profile),
                    format!("Profile{profile}"),
                ))
            }
            ClockMode::OffsetTemplate { template } => {
                let template = template.as_deref().ok_or(ApplyError::TemplateUnset)?;
                Ok((
                    template.replace("{offset}", &selector.to_string()),
                    format!("Offset {selector}"),
                ))
            }
        }
    }
}

#[async_trait]
impl ClockControl for ShellClockControl {
    async fn apply(&self, selector: i64) -> Result<ApplyOutcome, ApplyError> {
        let (command, description) = self.resolve(selector)?;
        info!(%command, "applying clock command");
        let (ok, output) = run_shell(&command).await;
        Ok(ApplyOutcome {
            ok,
            command,
            output,
            description,
        })
    }
}

/// Runs one command line through the platform shell, capturing combined
/// output, bounded by `COMMAND_TIMEOUT`.
async fn run_shell(command: &str) -> (bool, String) {
    let mut shell = if cfg!(windows) {
        let mut shell = Command::new("cmd");
        shell.arg("/C").arg(command);
        shell
    } else {
        let mut shell = Command::new("sh");
        shell.arg("-c").arg(command);
        shell
    };
    shell.kill_on_drop(true);

    match timeout(COMMAND_TIMEOUT, shell.output()).await {
        Ok(Ok(output)) => {
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            (output.status.success(), text)
        }
        Ok(Err(e)) => (false, format!("failed to run command: {e}")),
        Err(_) => (
            false,
            format!("command timed out after {}s", COMMAND_TIMEOUT.as_secs()),
        ),
    }
}
