//! Mapping from `BrokerError` to gRPC `Status`.
//!
//! Every status produced here carries the ASCII metadata entry
//! [`ERROR_KIND_METADATA`] set to [`BrokerError::kind_label`], so clients can
//! tell a typed broker failure apart from a transport failure without parsing
//! messages.
//!
//! # Mapping
//!
//! - **NotFound**: the location or oid does not exist (or the backend handle is gone)
//! - **InvalidArgument**: the request itself is malformed
//! - **FailedPrecondition**: broker state or configuration forbids the operation
//! - **Unavailable**: the probe or a backend failed; the caller may retry
//! - **Unimplemented**: no backend serves the resolved library
//! - **Internal**: I/O and shutdown failures

use broker_core::error::{BackendErrorKind, BrokerError};
use broker_proto::ERROR_KIND_METADATA;
use tonic::metadata::MetadataValue;
use tonic::{Code, Status};

/// Map a [`BrokerError`] to a gRPC [`Status`] tagged with its error kind.
///
/// # Examples
///
/// ```
/// use broker_core::error::BrokerError;
/// use broker_core::types::Oid;
/// use broker_server::grpc::map_broker_error_to_status;
/// use tonic::Code;
///
/// let status = map_broker_error_to_status(BrokerError::UnknownOid(Oid::new(3)));
/// assert_eq!(status.code(), Code::NotFound);
/// assert_eq!(status.metadata().get("broker-error-kind").unwrap(), "unknown_oid");
/// ```
pub fn map_broker_error_to_status(err: BrokerError) -> Status {
    let kind = err.kind_label();
    let code = match &err {
        // Missing objects → NotFound
        BrokerError::UnknownLocation(_) | BrokerError::UnknownOid(_) => Code::NotFound,

        // Bad request → InvalidArgument
        BrokerError::InvalidArgument(_) => Code::InvalidArgument,

        // State forbids the operation → FailedPrecondition
        BrokerError::LocationBusy { .. } | BrokerError::Config(_) => Code::FailedPrecondition,

        // Probe failed or timed out, or the broker is going away → Unavailable
        BrokerError::Probe(_) | BrokerError::ShuttingDown => Code::Unavailable,

        BrokerError::Backend(e) => match e.kind {
            BackendErrorKind::Load | BackendErrorKind::Attach | BackendErrorKind::Detach => {
                Code::Unavailable
            }
            BackendErrorKind::InvalidHandle => Code::NotFound,
            BackendErrorKind::Unsupported => Code::Unimplemented,
            BackendErrorKind::Unload => Code::Internal,
        },

        // Server-side failures → Internal
        BrokerError::Io(_) => Code::Internal,
        BrokerError::ShutdownFailed(_) => Code::Internal,
    };

    let message = match &err {
        BrokerError::ShutdownFailed(errors) => {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            format!("Shutdown failed: {}", messages.join("; "))
        }
        other => other.to_string(),
    };

    let mut status = Status::new(code, message);
    status
        .metadata_mut()
        .insert(ERROR_KIND_METADATA, MetadataValue::from_static(kind));
    status
}

/// Extension trait for converting `Result<T, BrokerError>` to `Result<T, Status>`.
pub trait BrokerResultExt<T> {
    /// Convert a broker error result to a tonic status result.
    fn map_broker_err(self) -> Result<T, Status>;
}

impl<T> BrokerResultExt<T> for Result<T, BrokerError> {
    fn map_broker_err(self) -> Result<T, Status> {
        self.map_err(map_broker_error_to_status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_core::error::{BackendError, ProbeError};
    use broker_core::types::{LocationKey, Oid};
    use std::time::Duration;

    fn kind_of(status: &Status) -> &str {
        status
            .metadata()
            .get(ERROR_KIND_METADATA)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    #[test]
    fn test_not_found_errors() {
        let location = LocationKey::parse("9").unwrap();
        let status = map_broker_error_to_status(BrokerError::UnknownLocation(location));
        assert_eq!(status.code(), Code::NotFound);
        assert_eq!(kind_of(&status), "unknown_location");
    }

    #[test]
    fn test_busy_is_failed_precondition() {
        let status = map_broker_error_to_status(BrokerError::LocationBusy {
            location: LocationKey::parse("1").unwrap(),
            oid: Oid::new(1),
        });
        assert_eq!(status.code(), Code::FailedPrecondition);
        assert_eq!(kind_of(&status), "location_busy");
    }

    #[test]
    fn test_probe_timeout_is_unavailable() {
        let status = map_broker_error_to_status(BrokerError::Probe(ProbeError::Timeout {
            program: "/etc/tai/mux/exec.sh".into(),
            argument: "list".into(),
            timeout: Duration::from_secs(10),
        }));
        assert_eq!(status.code(), Code::Unavailable);
        assert_eq!(kind_of(&status), "probe");
    }

    #[test]
    fn test_backend_kinds() {
        let unsupported = BackendError::new("libtai-x.so", BackendErrorKind::Unsupported, "none");
        let status = map_broker_error_to_status(unsupported.into());
        assert_eq!(status.code(), Code::Unimplemented);
        assert_eq!(kind_of(&status), "backend");

        let attach = BackendError::new("libtai-a.so", BackendErrorKind::Attach, "no reply");
        assert_eq!(
            Err::<(), _>(BrokerError::from(attach)).map_broker_err().unwrap_err().code(),
            Code::Unavailable
        );
    }

    #[test]
    fn test_shutting_down_is_unavailable() {
        let status = map_broker_error_to_status(BrokerError::ShuttingDown);
        assert_eq!(status.code(), Code::Unavailable);
        assert_eq!(kind_of(&status), "shutting_down");
    }

    #[test]
    fn test_shutdown_failed_lists_causes() {
        let status = map_broker_error_to_status(BrokerError::ShutdownFailed(vec![
            BrokerError::UnknownOid(Oid::new(1)),
            BrokerError::Config("bad".into()),
        ]));
        assert_eq!(status.code(), Code::Internal);
        assert!(status.message().contains("; "));
    }
}
