//! Custom error types for the broker.
//!
//! This module defines the primary error type, `BrokerError`, for the whole
//! workspace. Using the `thiserror` crate, it gives every crate one consistent
//! vocabulary for failures, from probe invocations to vendor backends.
//!
//! ## Error Hierarchy
//!
//! - **`Probe`**: the external probe executable failed to spawn, exited
//!   non-zero, timed out or printed something that is not a location list or
//!   a backend name. Wraps [`ProbeError`].
//! - **`UnknownLocation`** / **`UnknownOid`**: the caller referenced a key the
//!   registry does not hold. These are client errors, not server faults.
//! - **`LocationBusy`**: single-session policy rejected a second session.
//! - **`Backend`**: the vendor library failed during load, attach, detach or
//!   unload. Wraps [`BackendError`].
//! - **`Config`** / **`Io`**: startup and environment problems.
//! - **`ShuttingDown`**: a session was requested after shutdown began.
//! - **`ShutdownFailed`**: aggregate of everything that failed while releasing
//!   sessions at shutdown.
//!
//! By using `#[from]`, `BrokerError` is created from probe and backend errors
//! with the `?` operator.

use crate::types::{LocationKey, Oid};
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Probe Errors
// =============================================================================

/// Failure of a single probe invocation.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// The probe executable could not be started.
    #[error("failed to spawn probe '{program}' with argument '{argument}': {source}")]
    Spawn {
        program: String,
        argument: String,
        #[source]
        source: std::io::Error,
    },

    /// The probe exited with a non-zero status.
    #[error("probe '{program} {argument}' exited with {status}: {stderr}")]
    Exit {
        program: String,
        argument: String,
        status: String,
        stderr: String,
    },

    /// The probe did not finish within the configured timeout.
    #[error("probe '{program} {argument}' timed out after {timeout:?}")]
    Timeout {
        program: String,
        argument: String,
        timeout: Duration,
    },

    /// The probe output could not be parsed.
    #[error("probe '{program} {argument}' produced malformed output: {reason}")]
    Malformed {
        program: String,
        argument: String,
        reason: String,
    },

    /// The probe succeeded but printed nothing.
    #[error("probe '{program} {argument}' printed no library name")]
    Empty { program: String, argument: String },
}

// =============================================================================
// Backend Errors
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    Load,
    Attach,
    Detach,
    InvalidHandle,
    Unsupported,
    Unload,
}

impl std::fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            BackendErrorKind::Load => "load",
            BackendErrorKind::Attach => "attach",
            BackendErrorKind::Detach => "detach",
            BackendErrorKind::InvalidHandle => "invalid_handle",
            BackendErrorKind::Unsupported => "unsupported",
            BackendErrorKind::Unload => "unload",
        };
        write!(f, "{}", label)
    }
}

#[derive(Error, Debug, Clone)]
#[error("Backend '{backend}' {kind} error: {message}")]
pub struct BackendError {
    pub backend: String,
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(
        backend: impl Into<String>,
        kind: BackendErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            backend: backend.into(),
            kind,
            message: message.into(),
        }
    }
}

// =============================================================================
// Broker Error
// =============================================================================

/// Convenience alias for results using the broker error type.
pub type BrokerResult<T> = std::result::Result<T, BrokerError>;

/// Primary error type for the broker.
///
/// # Error Categories
///
/// 1. **Client errors** - `UnknownLocation`, `UnknownOid`, `LocationBusy`, `InvalidArgument`
///    - The request referenced something that does not exist or is not allowed
///    - Recovery: fix the request (usually: call `list()` first)
///
/// 2. **Collaborator errors** - `Probe`, `Backend`
///    - The probe executable or a vendor library failed
///    - Not retried internally; retry is a caller policy
///
/// 3. **Process errors** - `Config`, `Io`, `ShuttingDown`, `ShutdownFailed`
///    - Startup or teardown problems
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Probe invocation failed.
    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    /// `create()` referenced a location absent from the most recent `list()`.
    #[error("Unknown location '{0}' (not in the most recent list)")]
    UnknownLocation(LocationKey),

    /// No live session holds this oid.
    #[error("Unknown oid {0}")]
    UnknownOid(Oid),

    /// The location already has a live session and multiple sessions are disabled.
    #[error("Location '{location}' is busy (held by oid {oid})")]
    LocationBusy { location: LocationKey, oid: Oid },

    /// Vendor backend failure.
    #[error("{0}")]
    Backend(#[from] BackendError),

    /// Request argument could not be decoded.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration is missing or invalid.
    ///
    /// **Error Type**: Permanent - requires fixing the configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Standard I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The registry is shutting down and accepts no new sessions.
    #[error("Broker is shutting down")]
    ShuttingDown,

    /// Releasing sessions or backends at shutdown failed.
    ///
    /// Contains every error encountered; teardown continues past each one.
    #[error("Shutdown failed with {} error(s)", .0.len())]
    ShutdownFailed(Vec<BrokerError>),
}

impl BrokerError {
    /// Stable snake_case label for the variant, used in logs and as gRPC
    /// error metadata.
    pub fn kind_label(&self) -> &'static str {
        match self {
            BrokerError::Probe(_) => "probe",
            BrokerError::UnknownLocation(_) => "unknown_location",
            BrokerError::UnknownOid(_) => "unknown_oid",
            BrokerError::LocationBusy { .. } => "location_busy",
            BrokerError::Backend(_) => "backend",
            BrokerError::InvalidArgument(_) => "invalid_argument",
            BrokerError::Config(_) => "config",
            BrokerError::Io(_) => "io",
            BrokerError::ShuttingDown => "shutting_down",
            BrokerError::ShutdownFailed(_) => "shutdown_failed",
        }
    }
}

impl From<figment::Error> for BrokerError {
    fn from(err: figment::Error) -> Self {
        BrokerError::Config(err.to_string())
    }
}
