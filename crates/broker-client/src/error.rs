//! Client error types.
//!
//! Failures fall into three groups: the broker could not be reached
//! (`Transport`, `Connection`, `InvalidAddress`), the broker answered with a
//! typed error (`UnknownLocation` through `Backend`), or it answered with some
//! other status (`RpcStatus`).

use broker_core::types::Oid;
use broker_proto::ERROR_KIND_METADATA;
use thiserror::Error;
use tonic::{Code, Status};

/// Result type alias using ClientError.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to the broker.
#[derive(Error, Debug)]
pub enum ClientError {
    /// gRPC transport error (connection refused, reset, etc.).
    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// Connection failed with a descriptive message.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The server address could not be parsed.
    #[error("Invalid server address: {0}")]
    InvalidAddress(String),

    /// The location is not in the broker's latest listing.
    #[error("Unknown location: {0}")]
    UnknownLocation(String),

    /// No live session holds the oid.
    #[error("Unknown oid: {0}")]
    UnknownOid(Oid),

    /// Single-session policy rejected a second session.
    #[error("Location busy: {0}")]
    LocationBusy(String),

    /// The probe failed on the broker side.
    #[error("Probe failed: {0}")]
    Probe(String),

    /// A backend failed to load, attach or detach.
    #[error("Backend failed: {0}")]
    Backend(String),

    /// Any other status returned by the broker.
    #[error("gRPC status error: {0}")]
    RpcStatus(Status),

    /// The broker sent a response the client could not decode.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl ClientError {
    /// Decode a status into a typed error using its `broker-error-kind` tag.
    ///
    /// `oid` is the oid the request was about, if any.
    pub fn from_status(status: Status, oid: Option<Oid>) -> Self {
        let kind = status
            .metadata()
            .get(ERROR_KIND_METADATA)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let message = status.message().to_string();

        match kind.as_deref() {
            Some("unknown_location") => Self::UnknownLocation(message),
            Some("unknown_oid") => match oid {
                Some(oid) => Self::UnknownOid(oid),
                None => Self::RpcStatus(status),
            },
            Some("location_busy") => Self::LocationBusy(message),
            Some("probe") => Self::Probe(message),
            Some("backend") => Self::Backend(message),
            _ if status.code() == Code::Unavailable && kind.is_none() => {
                Self::Connection(message)
            }
            _ => Self::RpcStatus(status),
        }
    }

    /// True if the broker could not be reached at all.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Connection(_) | Self::InvalidAddress(_)
        )
    }
}
