//! Format backend traits
//!
//! These traits define the storage capability a session drives. A backend maps
//! scope descriptors to physical locations and opens handles on them; handles
//! do flat key/value get, set and enumerate. Implementations live in
//! infra/storage.

use crate::contract::{Format, Location, ScopeDescriptor, SettingsError};
use super::group_path::{FlatKey, GroupPath};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Error type for backend operations
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Location unavailable: {location}: {reason}")]
    Unavailable { location: Location, reason: String },

    #[error("Malformed location {location}: {message}")]
    Malformed { location: Location, message: String },

    #[error("Location is read-only: {location}")]
    ReadOnlyScope { location: Location },

    #[error("Storage failure at {location}: {source}")]
    Storage {
        location: Location,
        #[source]
        source: anyhow::Error,
    },
}

impl From<BackendError> for SettingsError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unavailable { location, reason } => {
                SettingsError::LocationUnavailable { location, reason }
            }
            BackendError::Malformed { location, message } => {
                SettingsError::MalformedLocation { location, message }
            }
            BackendError::ReadOnlyScope { location } => SettingsError::ReadOnlyScope { location },
            BackendError::Storage { location, source } => {
                SettingsError::Storage { location, source }
            }
        }
    }
}

/// How a handle was opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// The session's primary location; the only writable one
    Primary,
    /// A fallback location
    ReadOnly,
}

/// Storage technology capable of holding settings
#[async_trait]
pub trait FormatBackend: Send + Sync {
    /// Format this backend serves
    fn format(&self) -> Format;

    /// Physical location of a scope. Pure function of its input.
    fn locate(&self, scope: &ScopeDescriptor) -> Location;

    /// Acquire the resource behind a location
    ///
    /// Fails with [`BackendError::Unavailable`] when the location cannot be
    /// accessed (e.g. permission denied).
    async fn open(
        &self,
        location: &Location,
        access: Access,
    ) -> Result<Box<dyn BackendHandle>, BackendError>;
}

/// An open location
///
/// Dropping a handle releases it; [`flush`](BackendHandle::flush) persists any
/// buffered writes first.
#[async_trait]
pub trait BackendHandle: Send {
    fn location(&self) -> &Location;

    fn access(&self) -> Access;

    async fn get(&mut self, key: &FlatKey) -> Result<Option<String>, BackendError>;

    /// Implementations must call [`ensure_writable`](BackendHandle::ensure_writable) first
    async fn set(&mut self, key: &FlatKey, value: &str) -> Result<(), BackendError>;

    /// Remove exactly `key`. Removing an absent key is not an error.
    async fn remove(&mut self, key: &FlatKey) -> Result<(), BackendError>;

    /// Every key stored under `prefix`, at any depth
    async fn enumerate(&mut self, prefix: &GroupPath) -> Result<Vec<FlatKey>, BackendError>;

    async fn flush(&mut self) -> Result<(), BackendError>;

    /// Reject writes through a handle that was not opened as primary
    fn ensure_writable(&self) -> Result<(), BackendError> {
        match self.access() {
            Access::Primary => Ok(()),
            Access::ReadOnly => Err(BackendError::ReadOnlyScope {
                location: self.location().clone(),
            }),
        }
    }
}

/// Backends available to sessions, selected by identity format
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<Format, Arc<dyn FormatBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under its own format, replacing any previous one
    pub fn register(&mut self, backend: Arc<dyn FormatBackend>) {
        self.backends.insert(backend.format(), backend);
    }

    pub fn with(mut self, backend: Arc<dyn FormatBackend>) -> Self {
        self.register(backend);
        self
    }

    pub fn get(&self, format: &Format) -> Result<Arc<dyn FormatBackend>, SettingsError> {
        self.backends
            .get(format)
            .cloned()
            .ok_or_else(|| SettingsError::UnregisteredFormat(format.clone()))
    }

    pub fn formats(&self) -> impl Iterator<Item = &Format> {
        self.backends.keys()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("formats", &self.backends.keys().collect::<Vec<_>>())
            .finish()
    }
}
