//! In-memory format backend
//!
//! Volatile, process-local storage. Clones share the same store, so several
//! sessions (or a test and a session) see each other's writes.

use crate::contract::{Format, Location, ScopeDescriptor};
use crate::domain::{Access, BackendError, BackendHandle, FlatKey, FormatBackend, GroupPath};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

type Entries = BTreeMap<FlatKey, String>;

#[derive(Default)]
struct Store {
    locations: HashMap<Location, Entries>,
    revoked: HashSet<Location>,
}

#[derive(Clone, Default)]
pub struct InMemoryBackend {
    store: Arc<RwLock<Store>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value directly at the location of `scope`
    pub fn seed(&self, scope: &ScopeDescriptor, key: &FlatKey, value: &str) {
        let location = self.locate(scope);
        self.store
            .write()
            .locations
            .entry(location)
            .or_default()
            .insert(key.clone(), value.to_string());
    }

    /// Value currently stored at `location`, bypassing any session
    pub fn stored(&self, location: &Location, key: &FlatKey) -> Option<String> {
        self.store
            .read()
            .locations
            .get(location)
            .and_then(|entries| entries.get(key).cloned())
    }

    /// Make `location` fail to open, as if access were denied
    pub fn revoke_access(&self, location: &Location) {
        self.store.write().revoked.insert(location.clone());
    }

    pub fn restore_access(&self, location: &Location) {
        self.store.write().revoked.remove(location);
    }

    /// Number of keys stored at `location`
    pub fn len(&self, location: &Location) -> usize {
        self.store
            .read()
            .locations
            .get(location)
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl FormatBackend for InMemoryBackend {
    fn format(&self) -> Format {
        Format::InMemory
    }

    fn locate(&self, scope: &ScopeDescriptor) -> Location {
        Location::new(format!("inmemory:{}", super::scope_path(scope)))
    }

    async fn open(
        &self,
        location: &Location,
        access: Access,
    ) -> Result<Box<dyn BackendHandle>, BackendError> {
        if self.store.read().revoked.contains(location) {
            return Err(BackendError::Unavailable {
                location: location.clone(),
                reason: "access denied".to_string(),
            });
        }
        Ok(Box::new(InMemoryHandle {
            store: self.store.clone(),
            location: location.clone(),
            access,
        }))
    }
}

struct InMemoryHandle {
    store: Arc<RwLock<Store>>,
    location: Location,
    access: Access,
}

#[async_trait]
impl BackendHandle for InMemoryHandle {
    fn location(&self) -> &Location {
        &self.location
    }

    fn access(&self) -> Access {
        self.access
    }

    async fn get(&mut self, key: &FlatKey) -> Result<Option<String>, BackendError> {
        Ok(self
            .store
            .read()
            .locations
            .get(&self.location)
            .and_then(|entries| entries.get(key).cloned()))
    }

    async fn set(&mut self, key: &FlatKey, value: &str) -> Result<(), BackendError> {
        self.ensure_writable()?;
        self.store
            .write()
            .locations
            .entry(self.location.clone())
            .or_default()
            .insert(key.clone(), value.to_string());
        Ok(())
    }

    async fn remove(&mut self, key: &FlatKey) -> Result<(), BackendError> {
        self.ensure_writable()?;
        if let Some(entries) = self.store.write().locations.get_mut(&self.location) {
            entries.remove(key);
        }
        Ok(())
    }

    async fn enumerate(&mut self, prefix: &GroupPath) -> Result<Vec<FlatKey>, BackendError> {
        Ok(self
            .store
            .read()
            .locations
            .get(&self.location)
            .map(|entries| {
                entries
                    .keys()
                    .filter(|key| key.is_under(prefix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn flush(&mut self) -> Result<(), BackendError> {
        Ok(())
    }
}
