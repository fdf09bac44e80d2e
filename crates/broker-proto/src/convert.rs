//! Conversions between proto messages and `broker-core` domain types.
//!
//! Domain -> proto conversions are `From` impls and cannot fail. Proto ->
//! domain goes through [`ToDomain`], which validates what arrives off the
//! wire (a location key must still parse, a session must be present).

use crate::broker;
use broker_core::types::{
    AdapterKind, BackendHandle, BackendName, LocationKey, ModuleDescriptor, ModuleInfo, ModuleMap,
    Oid, SessionInfo,
};
use chrono::{DateTime, Utc};

/// Trait for converting proto types to domain types.
pub trait ToDomain<T> {
    /// Convert, describing the problem if the message is malformed.
    fn to_domain(self) -> Result<T, String>;
}

// =============================================================================
// Adapter kind
// =============================================================================

impl From<AdapterKind> for broker::AdapterKind {
    fn from(kind: AdapterKind) -> Self {
        match kind {
            AdapterKind::Exec => broker::AdapterKind::Exec,
            AdapterKind::Static => broker::AdapterKind::Static,
        }
    }
}

impl ToDomain<AdapterKind> for broker::AdapterKind {
    fn to_domain(self) -> Result<AdapterKind, String> {
        match self {
            broker::AdapterKind::Exec => Ok(AdapterKind::Exec),
            broker::AdapterKind::Static => Ok(AdapterKind::Static),
            broker::AdapterKind::Unspecified => Err("adapter kind unspecified".to_string()),
        }
    }
}

/// Decode a raw `AdapterKind` field.
pub fn adapter_from_i32(raw: i32) -> Result<AdapterKind, String> {
    broker::AdapterKind::try_from(raw)
        .map_err(|_| format!("unknown adapter kind {}", raw))?
        .to_domain()
}

// =============================================================================
// Descriptors
// =============================================================================

impl From<ModuleDescriptor> for broker::ModuleDescriptor {
    fn from(descriptor: ModuleDescriptor) -> Self {
        broker::ModuleDescriptor {
            location: descriptor.location.to_string(),
            backend: descriptor.backend.to_string(),
        }
    }
}

impl ToDomain<ModuleDescriptor> for broker::ModuleDescriptor {
    fn to_domain(self) -> Result<ModuleDescriptor, String> {
        Ok(ModuleDescriptor {
            location: LocationKey::parse(&self.location)?,
            backend: BackendName::new(self.backend),
        })
    }
}

impl From<ModuleMap> for broker::ListResponse {
    fn from(map: ModuleMap) -> Self {
        broker::ListResponse {
            modules: map.into_iter().map(Into::into).collect(),
        }
    }
}

impl ToDomain<ModuleMap> for broker::ListResponse {
    fn to_domain(self) -> Result<ModuleMap, String> {
        let entries = self
            .modules
            .into_iter()
            .map(ToDomain::to_domain)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ModuleMap::new(entries))
    }
}

// =============================================================================
// Sessions
// =============================================================================

impl From<SessionInfo> for broker::Session {
    fn from(session: SessionInfo) -> Self {
        broker::Session {
            oid: session.oid.get(),
            location: session.location.to_string(),
            backend: session.backend.to_string(),
            backend_handle: session.backend_handle.id,
            created_at_ms: session.created_at.timestamp_millis(),
        }
    }
}

impl ToDomain<SessionInfo> for broker::Session {
    fn to_domain(self) -> Result<SessionInfo, String> {
        Ok(SessionInfo {
            oid: Oid::new(self.oid),
            location: LocationKey::parse(&self.location)?,
            backend: BackendName::new(self.backend),
            backend_handle: BackendHandle {
                id: self.backend_handle,
            },
            created_at: timestamp_from_millis(self.created_at_ms)?,
        })
    }
}

impl ToDomain<SessionInfo> for Option<broker::Session> {
    fn to_domain(self) -> Result<SessionInfo, String> {
        self.ok_or_else(|| "response carries no session".to_string())?
            .to_domain()
    }
}

impl From<ModuleInfo> for broker::ModuleInfo {
    fn from(info: ModuleInfo) -> Self {
        broker::ModuleInfo {
            session: Some(info.session.into()),
            adapter: broker::AdapterKind::from(info.adapter) as i32,
        }
    }
}

impl ToDomain<ModuleInfo> for broker::ModuleInfo {
    fn to_domain(self) -> Result<ModuleInfo, String> {
        Ok(ModuleInfo {
            session: self.session.to_domain()?,
            adapter: adapter_from_i32(self.adapter)?,
        })
    }
}

/// Convert Unix epoch milliseconds to a UTC timestamp.
pub fn timestamp_from_millis(ms: i64) -> Result<DateTime<Utc>, String> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| format!("timestamp {} out of range", ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_survives_the_wire() {
        let created_at = timestamp_from_millis(1_700_000_000_123).unwrap();
        let session = SessionInfo {
            oid: Oid::new(7),
            location: LocationKey::parse("3").unwrap(),
            backend: BackendName::new("libtai-a.so"),
            backend_handle: BackendHandle { id: 11 },
            created_at,
        };

        let wire: broker::Session = session.clone().into();
        assert_eq!(wire.oid, 7);
        assert_eq!(wire.created_at_ms, 1_700_000_000_123);
        assert_eq!(wire.to_domain().unwrap(), session);
    }

    #[test]
    fn test_malformed_location_is_rejected() {
        let wire = broker::ModuleDescriptor {
            location: "  ".to_string(),
            backend: "libtai-a.so".to_string(),
        };
        assert!(wire.to_domain().is_err());
    }

    #[test]
    fn test_missing_session_is_rejected() {
        let info = broker::ModuleInfo {
            session: None,
            adapter: broker::AdapterKind::Exec as i32,
        };
        assert!(info.to_domain().is_err());
    }

    #[test]
    fn test_adapter_kind_decoding() {
        assert_eq!(adapter_from_i32(1).unwrap(), AdapterKind::Exec);
        assert_eq!(adapter_from_i32(2).unwrap(), AdapterKind::Static);
        assert!(adapter_from_i32(0).is_err());
        assert!(adapter_from_i32(99).is_err());
    }

    #[test]
    fn test_list_response_keeps_order() {
        let map = ModuleMap::new(
            ["2", "1", "3"]
                .iter()
                .map(|l| ModuleDescriptor {
                    location: LocationKey::parse(l).unwrap(),
                    backend: BackendName::new("libtai-b.so"),
                })
                .collect(),
        );
        let wire: broker::ListResponse = map.clone().into();
        assert_eq!(wire.modules[0].location, "2");
        assert_eq!(wire.to_domain().unwrap(), map);
    }
}
