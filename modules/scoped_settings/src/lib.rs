//! Scoped Settings
//!
//! Hierarchical key/value settings resolved across base scopes (user, system)
//! and component scopes (organization, application, subsystem). Reads fall
//! back from the most specific scope to the most general one; writes only
//! ever reach the primary scope of a session.
//!
//! Storage is pluggable through [`FormatBackend`]. In-memory, YAML file and
//! database backends are provided.

// Public exports
pub mod contract;
pub use contract::{
    BaseScope, ComponentScope, Format, Identity, Location, ResolvedScope, ScopeDescriptor,
    SettingsError,
};

pub mod config;
pub use config::Config;

pub mod domain;
pub use domain::{
    Access, BackendError, BackendHandle, BackendRegistry, FallbackPolicy, FlatKey,
    FormatBackend, GroupGuard, GroupPath, ScopeResolver, SessionOptions, SettingValue,
    SettingsSession,
};

#[doc(hidden)]
pub mod infra;
pub use infra::storage::{DatabaseBackend, InMemoryBackend, YamlFileBackend};
