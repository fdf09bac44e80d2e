//! Discovery, backends and session bookkeeping for the module broker.
//!
//! - [`probe`]: runs the external probe executable
//! - [`platform`]: exec and static discovery adapters
//! - [`backends`]: backend lookup table and the simulated backend
//! - [`registry`]: the module registry

pub mod backends;
pub mod platform;
pub mod probe;
pub mod registry;

pub use backends::{BackendTable, SimulatedBackend, SimulatedFactory};
pub use platform::{build_platform, ExecPlatform, PlatformAdapter, StaticPlatform};
pub use probe::ProbeInvoker;
pub use registry::ModuleRegistry;
