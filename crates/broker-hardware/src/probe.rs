//! External probe invocation.
//!
//! The probe is an executable owned by the platform integrator. The broker
//! runs it in two shapes:
//!
//! ```text
//! probe list          ->  one location key per line        (exit 0)
//! probe <location>    ->  backend library name, one line   (exit 0, may take >0.5s)
//! probe <anything else>                                    (exit != 0)
//! ```
//!
//! Every call spawns a fresh process. Output is drained completely through
//! [`tokio::process::Command::output`], so a chatty child can never stall on a
//! full pipe, and `kill_on_drop` guarantees a timed-out or cancelled call does
//! not leave the child running.

use broker_core::error::ProbeError;
use broker_core::types::{BackendName, LocationKey};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Argument that asks the probe to enumerate locations.
pub const LIST_ARGUMENT: &str = "list";

/// Runs the probe executable.
#[derive(Debug, Clone)]
pub struct ProbeInvoker {
    program: PathBuf,
    timeout: Duration,
}

impl ProbeInvoker {
    /// Create an invoker for `program` with a per-invocation timeout.
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Path of the probe executable.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Per-invocation timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Enumerate module locations with `probe list`.
    ///
    /// Blank lines are skipped. Keys are returned in probe order.
    ///
    /// # Errors
    /// Returns [`ProbeError`] if the probe fails, times out, prints non-UTF-8
    /// output, or prints a malformed or duplicate key.
    pub async fn enumerate(&self) -> Result<Vec<LocationKey>, ProbeError> {
        let stdout = self.invoke(LIST_ARGUMENT).await?;

        let mut seen = HashSet::new();
        let mut locations = Vec::new();
        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            let key = LocationKey::parse(line)
                .map_err(|reason| self.malformed(LIST_ARGUMENT, reason))?;
            if !seen.insert(key.clone()) {
                return Err(self.malformed(
                    LIST_ARGUMENT,
                    format!("duplicate location '{}'", key),
                ));
            }
            locations.push(key);
        }

        tracing::debug!(count = locations.len(), "probe enumerated locations");
        Ok(locations)
    }

    /// Resolve the backend library for `location` with `probe <location>`.
    ///
    /// The first non-empty output line is the backend name.
    ///
    /// # Errors
    /// Returns [`ProbeError`] if the probe fails, times out, or prints nothing.
    pub async fn resolve(&self, location: &LocationKey) -> Result<BackendName, ProbeError> {
        let stdout = self.invoke(location.as_str()).await?;

        let mut lines = stdout.lines().map(str::trim).filter(|l| !l.is_empty());
        let name = lines.next().map(BackendName::new).ok_or_else(|| ProbeError::Empty {
            program: self.program_label(),
            argument: location.to_string(),
        })?;

        let extra = lines.count();
        if extra > 0 {
            tracing::warn!(
                %location,
                backend = %name,
                extra_lines = extra,
                "probe printed more than one line; using the first"
            );
        }

        Ok(name)
    }

    /// Run the probe once and return its trimmed stdout.
    async fn invoke(&self, argument: &str) -> Result<String, ProbeError> {
        let started = Instant::now();

        let mut command = Command::new(&self.program);
        command
            .arg(argument)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(ProbeError::Spawn {
                    program: self.program_label(),
                    argument: argument.to_string(),
                    source,
                })
            }
            Err(_) => {
                tracing::warn!(
                    program = %self.program.display(),
                    argument,
                    timeout = ?self.timeout,
                    "probe timed out; child killed"
                );
                return Err(ProbeError::Timeout {
                    program: self.program_label(),
                    argument: argument.to_string(),
                    timeout: self.timeout,
                });
            }
        };

        tracing::debug!(
            program = %self.program.display(),
            argument,
            status = %output.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "probe finished"
        );

        if !output.status.success() {
            return Err(ProbeError::Exit {
                program: self.program_label(),
                argument: argument.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|_| self.malformed(argument, "output is not valid UTF-8".to_string()))?;
        Ok(stdout.trim_end().to_string())
    }

    fn program_label(&self) -> String {
        self.program.display().to_string()
    }

    fn malformed(&self, argument: &str, reason: String) -> ProbeError {
        ProbeError::Malformed {
            program: self.program_label(),
            argument: argument.to_string(),
            reason,
        }
    }
}
