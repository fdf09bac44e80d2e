//! Domain types shared by every broker crate.
//!
//! ```text
//!   probe "list"        probe "<location>"          create(location)
//!  ─────────────▶ LocationKey ─────────────▶ BackendName ─────────────▶ Oid
//!                      │                         │                      │
//!                      └──── ModuleDescriptor ───┘          SessionInfo ┘
//! ```
//!
//! Locations and backend names are string newtypes so the registry cannot
//! confuse a slot key with a library name. Oids are plain `u64` handles that
//! the registry allocates monotonically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Location Keys
// =============================================================================

/// Key identifying a physical module slot, as reported by the probe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationKey(String);

impl LocationKey {
    /// Parse a location key.
    ///
    /// Surrounding whitespace is trimmed. The key must be non-empty and must
    /// not contain interior whitespace (one key per probe output line).
    ///
    /// # Errors
    /// Returns a description of the problem if the key is malformed.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let key = raw.trim();
        if key.is_empty() {
            return Err("location key is empty".to_string());
        }
        if key.chars().any(char::is_whitespace) {
            return Err(format!("location key '{}' contains whitespace", key));
        }
        Ok(Self(key.to_string()))
    }

    /// Borrow the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LocationKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Backend Names
// =============================================================================

/// Name of the vendor library backing a location (e.g. `libtai-a.so`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendName(String);

impl BackendName {
    /// Create a backend name. Surrounding whitespace is trimmed.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_string())
    }

    /// Borrow the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the name is empty after trimming.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for BackendName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Object Identifiers
// =============================================================================

/// Opaque session handle. Unique for the lifetime of the broker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Oid(u64);

impl Oid {
    /// Wrap a raw oid value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value, as carried on the wire.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u64> for Oid {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Backend-side object handle returned by `attach`.
///
/// This is the vendor library's own identifier for the module object, the
/// "real oid" behind a broker [`Oid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackendHandle {
    /// Identifier allocated by the backend.
    pub id: u64,
}

// =============================================================================
// Descriptors and Sessions
// =============================================================================

/// Discovery source the broker consults for locations and backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    /// Locations and backends come from the external probe executable.
    #[default]
    Exec,
    /// Locations and backends come from a static JSON map.
    Static,
}

impl AdapterKind {
    /// Lowercase label used in configuration and on the wire.
    pub fn label(self) -> &'static str {
        match self {
            AdapterKind::Exec => "exec",
            AdapterKind::Static => "static",
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-location metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Location key.
    pub location: LocationKey,
    /// Resolved backend library name.
    pub backend: BackendName,
}

/// Snapshot of a live session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Broker-allocated handle.
    pub oid: Oid,
    /// Location the session was created for.
    pub location: LocationKey,
    /// Backend library serving the session.
    pub backend: BackendName,
    /// Handle inside the backend.
    pub backend_handle: BackendHandle,
    /// When the session was committed.
    pub created_at: DateTime<Utc>,
}

/// Session snapshot plus the discovery source that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    /// The session.
    pub session: SessionInfo,
    /// Platform adapter in use.
    pub adapter: AdapterKind,
}

// =============================================================================
// Module Map
// =============================================================================

/// Ordered `LocationKey -> ModuleDescriptor` mapping returned by `list()`.
///
/// Iteration follows probe order; lookups are by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleMap {
    entries: Vec<ModuleDescriptor>,
}

impl ModuleMap {
    /// Build a map from descriptors in probe order.
    pub fn new(entries: Vec<ModuleDescriptor>) -> Self {
        Self { entries }
    }

    /// Descriptor for a location, if present.
    pub fn get(&self, location: &str) -> Option<&ModuleDescriptor> {
        self.entries.iter().find(|d| d.location.as_str() == location)
    }

    /// True if the location is present.
    pub fn contains(&self, location: &str) -> bool {
        self.get(location).is_some()
    }

    /// Location keys in probe order.
    pub fn keys(&self) -> impl Iterator<Item = &LocationKey> {
        self.entries.iter().map(|d| &d.location)
    }

    /// Descriptors in probe order.
    pub fn iter(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.entries.iter()
    }

    /// Number of locations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no locations were enumerated.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consume the map, yielding descriptors in probe order.
    pub fn into_vec(self) -> Vec<ModuleDescriptor> {
        self.entries
    }
}

impl IntoIterator for ModuleMap {
    type Item = ModuleDescriptor;
    type IntoIter = std::vec::IntoIter<ModuleDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
