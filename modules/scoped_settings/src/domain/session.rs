//! Settings session - group scoping, fallback reads and primary-only writes

use super::backend::{Access, BackendError, BackendHandle, BackendRegistry, FormatBackend};
use super::coercion::SettingValue;
use super::group_path::{FlatKey, GroupPath};
use super::resolver::{FallbackPolicy, ScopeResolver};
use crate::contract::{Identity, Location, ResolvedScope, SettingsError};
use futures::future::BoxFuture;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Per-session behavior
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub policy: FallbackPolicy,
    /// Separator between items of list values
    pub list_separator: char,
    /// Values used when no location holds a key
    pub defaults: BTreeMap<FlatKey, String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            policy: FallbackPolicy::default(),
            list_separator: ',',
            defaults: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Closed,
    Open,
}

/// Stateful access to the settings of one identity
///
/// Reads walk the resolved scopes in order and return the first hit. Writes go
/// to the primary location only. Backend handles are opened lazily, one per
/// physical location, and released on [`close`](SettingsSession::close).
///
/// A session is confined to one sequence of operations at a time; every
/// operation takes `&mut self`.
///
/// Some backends buffer writes until the handle is flushed (the YAML backend
/// writes its file only then). End a session with [`close`](SettingsSession::close)
/// or run it through [`with_open`](SettingsSession::with_open); dropping an open
/// session discards buffered writes.
pub struct SettingsSession {
    identity: Identity,
    backend: Arc<dyn FormatBackend>,
    scopes: Vec<ResolvedScope>,
    locations: Vec<Location>,
    list_separator: char,
    defaults: BTreeMap<FlatKey, String>,
    state: SessionState,
    group: GroupPath,
    handles: HashMap<Location, Box<dyn BackendHandle>>,
}

impl SettingsSession {
    /// Create a closed session for `identity`
    pub fn new(
        identity: Identity,
        registry: &BackendRegistry,
        options: SessionOptions,
    ) -> Result<Self, SettingsError> {
        let backend = registry.get(identity.format())?;
        let scopes = ScopeResolver::new(options.policy).resolve(&identity);
        let locations = scopes
            .iter()
            .map(|scope| backend.locate(&scope.descriptor))
            .collect();

        Ok(Self {
            identity,
            backend,
            scopes,
            locations,
            list_separator: options.list_separator,
            defaults: options.defaults,
            state: SessionState::Closed,
            group: GroupPath::root(),
            handles: HashMap::new(),
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Scopes in search order
    pub fn scopes(&self) -> &[ResolvedScope] {
        &self.scopes
    }

    /// Physical locations in search order
    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    /// The only location writes go to
    pub fn primary_location(&self) -> &Location {
        // resolve() always yields the primary scope
        &self.locations[0]
    }

    // ===== Lifecycle =====

    /// Transition to open. No backend handle is opened yet.
    pub fn open(&mut self) -> Result<(), SettingsError> {
        if self.state == SessionState::Closed {
            tracing::debug!(
                organization = self.identity.organization(),
                format = %self.identity.format(),
                primary = %self.primary_location(),
                "Opening settings session"
            );
            self.state = SessionState::Open;
        }
        Ok(())
    }

    /// Flush and release every open handle, then transition to closed.
    ///
    /// All handles are released even when a flush fails; the first failure is
    /// returned.
    pub async fn close(&mut self) -> Result<(), SettingsError> {
        self.ensure_open()?;

        let mut first_error: Option<BackendError> = None;
        for (location, mut handle) in self.handles.drain() {
            match handle.flush().await {
                Ok(()) => tracing::debug!(%location, "Flushed settings handle"),
                Err(e) => {
                    tracing::warn!(%location, error = %e, "Failed to flush settings handle");
                    first_error.get_or_insert(e);
                }
            }
        }

        self.group = GroupPath::root();
        self.state = SessionState::Closed;

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Open the session, run `body`, and close it on every exit path.
    ///
    /// An error from `body` takes precedence over an error from closing.
    pub async fn with_open<T, F>(&mut self, body: F) -> Result<T, SettingsError>
    where
        F: for<'s> FnOnce(&'s mut SettingsSession) -> BoxFuture<'s, Result<T, SettingsError>>,
    {
        self.open()?;
        let outcome = body(self).await;
        let closed = if self.is_open() {
            self.close().await
        } else {
            Ok(())
        };
        match (outcome, closed) {
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
            (Ok(value), Ok(())) => Ok(value),
        }
    }

    // ===== Groups =====

    /// The current group
    pub fn group(&self) -> &GroupPath {
        &self.group
    }

    pub fn push_group(&mut self, name: &str) -> Result<(), SettingsError> {
        self.ensure_open()?;
        self.group.push(name)
    }

    /// Fails with [`SettingsError::EmptyStack`] when no group is pushed
    pub fn pop_group(&mut self) -> Result<String, SettingsError> {
        self.ensure_open()?;
        self.group.pop()
    }

    /// Enter a group (possibly nested, `a/b`) until the returned guard drops
    ///
    /// The guard dereferences to the session. An empty path leaves the current
    /// group unchanged.
    pub fn ingroup(&mut self, path: &str) -> Result<GroupGuard<'_>, SettingsError> {
        self.ensure_open()?;
        let path = GroupPath::parse(path)?;
        let prior = self.group.clone();
        self.group.extend(&path);
        Ok(GroupGuard {
            session: self,
            prior,
        })
    }

    /// Flattened key for a key relative to the current group
    pub fn absolute_key(&self, key: &str) -> Result<FlatKey, SettingsError> {
        if key.is_empty() {
            return Err(SettingsError::InvalidKey {
                key: key.to_string(),
                reason: "key must be a non-empty string".to_string(),
            });
        }
        let relative = FlatKey::unflatten(key)?;
        self.group.join(relative.group()).flatten(relative.leaf())
    }

    // ===== Reads =====

    /// The value for `key`, or `None` when no location holds it
    ///
    /// `None` is distinct from `Some("")`, a value set to the empty string.
    pub async fn value(&mut self, key: &str) -> Result<Option<String>, SettingsError> {
        self.ensure_open()?;
        let key = self.absolute_key(key)?;
        self.lookup(&key).await
    }

    pub async fn value_or(&mut self, key: &str, default: &str) -> Result<String, SettingsError> {
        Ok(self
            .value(key)
            .await?
            .unwrap_or_else(|| default.to_string()))
    }

    pub async fn required_value(&mut self, key: &str) -> Result<String, SettingsError> {
        self.required::<String>(key).await
    }

    /// The value for `key` converted to `T`
    pub async fn typed_value<T: SettingValue>(
        &mut self,
        key: &str,
    ) -> Result<Option<T>, SettingsError> {
        self.ensure_open()?;
        let key = self.absolute_key(key)?;
        match self.lookup(&key).await? {
            Some(raw) => self.coerce(&key, raw).map(Some),
            None => Ok(None),
        }
    }

    /// Like [`typed_value`](Self::typed_value) but a missing key is an error
    pub async fn required<T: SettingValue>(&mut self, key: &str) -> Result<T, SettingsError> {
        self.ensure_open()?;
        let key = self.absolute_key(key)?;
        match self.lookup(&key).await? {
            Some(raw) => self.coerce(&key, raw),
            None => Err(SettingsError::RequiredSettingMissing {
                key: key.to_string(),
                value_type: T::TYPE_NAME,
                locations: self.locations.clone(),
            }),
        }
    }

    pub async fn int_value(&mut self, key: &str) -> Result<Option<i64>, SettingsError> {
        self.typed_value(key).await
    }

    pub async fn float_value(&mut self, key: &str) -> Result<Option<f64>, SettingsError> {
        self.typed_value(key).await
    }

    pub async fn bool_value(&mut self, key: &str) -> Result<Option<bool>, SettingsError> {
        self.typed_value(key).await
    }

    pub async fn list_value(&mut self, key: &str) -> Result<Option<Vec<String>>, SettingsError> {
        self.typed_value(key).await
    }

    /// Whether any location, or the defaults, hold `key`
    pub async fn contains(&mut self, key: &str) -> Result<bool, SettingsError> {
        Ok(self.value(key).await?.is_some())
    }

    // ===== Writes =====

    /// Store `value` for `key` in the primary location
    pub async fn set_value(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.ensure_open()?;
        let key = self.absolute_key(key)?;
        let handle = self.handle(0).await?;
        handle.set(&key, value).await?;
        tracing::debug!(key = %key, location = %handle.location(), "Stored setting");
        Ok(())
    }

    /// Remove `key` and every key nested under it from the primary location
    ///
    /// Fallback locations are untouched, so a fallback value may show through.
    pub async fn remove(&mut self, key: &str) -> Result<(), SettingsError> {
        self.ensure_open()?;
        let key = self.absolute_key(key)?;
        let mut subtree = key.group().clone();
        subtree.push(key.leaf())?;

        let handle = self.handle(0).await?;
        handle.remove(&key).await?;
        for nested in handle.enumerate(&subtree).await? {
            handle.remove(&nested).await?;
        }
        Ok(())
    }

    /// Remove every key inside the current group from the primary location
    ///
    /// At the root group this is [`clear`](Self::clear).
    pub async fn remove_group(&mut self) -> Result<(), SettingsError> {
        self.ensure_open()?;
        let group = self.group.clone();
        self.remove_under(&group).await
    }

    /// Remove every key from the primary location
    pub async fn clear(&mut self) -> Result<(), SettingsError> {
        self.ensure_open()?;
        self.remove_under(&GroupPath::root()).await
    }

    // ===== Introspection =====

    /// Every readable key inside the current group, relative to it
    pub async fn all_keys(&mut self) -> Result<Vec<String>, SettingsError> {
        let keys = self.visible_keys().await?;
        let mut keys: Vec<String> = keys.iter().map(FlatKey::to_string).collect();
        keys.sort();
        Ok(keys)
    }

    /// Keys directly inside the current group
    pub async fn child_keys(&mut self) -> Result<Vec<String>, SettingsError> {
        let keys = self.visible_keys().await?;
        Ok(keys
            .iter()
            .filter(|key| key.group().is_root())
            .map(|key| key.leaf().to_string())
            .collect())
    }

    /// Non-empty groups directly inside the current group
    pub async fn child_groups(&mut self) -> Result<Vec<String>, SettingsError> {
        let keys = self.visible_keys().await?;
        let groups: BTreeSet<String> = keys
            .iter()
            .filter_map(|key| key.group().segments().first().cloned())
            .collect();
        Ok(groups.into_iter().collect())
    }

    /// Every group holding at least one key, at any depth, relative to the current group
    pub async fn all_groups(&mut self) -> Result<Vec<String>, SettingsError> {
        let keys = self.visible_keys().await?;
        let groups: BTreeSet<String> = keys
            .iter()
            .filter(|key| !key.group().is_root())
            .map(|key| key.group().to_string())
            .collect();
        Ok(groups.into_iter().collect())
    }

    // ===== Helpers =====

    fn ensure_open(&self) -> Result<(), SettingsError> {
        match self.state {
            SessionState::Open => Ok(()),
            SessionState::Closed => Err(SettingsError::SessionClosed),
        }
    }

    fn coerce<T: SettingValue>(&self, key: &FlatKey, raw: String) -> Result<T, SettingsError> {
        T::coerce(&raw, self.list_separator).map_err(|message| SettingsError::TypeCoercion {
            key: key.to_string(),
            value: raw,
            value_type: T::TYPE_NAME,
            message,
        })
    }

    async fn remove_under(&mut self, group: &GroupPath) -> Result<(), SettingsError> {
        let handle = self.handle(0).await?;
        for key in handle.enumerate(group).await? {
            handle.remove(&key).await?;
        }
        tracing::debug!(group = %group, location = %handle.location(), "Removed settings group");
        Ok(())
    }

    /// First hit in search order, then the defaults
    async fn lookup(&mut self, key: &FlatKey) -> Result<Option<String>, SettingsError> {
        for index in 0..self.locations.len() {
            let handle = match self.handle(index).await {
                Ok(handle) => handle,
                Err(BackendError::Unavailable { location, reason }) => {
                    tracing::debug!(%location, %reason, "Skipping unavailable settings location");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if let Some(value) = handle.get(key).await? {
                return Ok(Some(value));
            }
        }
        Ok(self.defaults.get(key).cloned())
    }

    /// Keys under the current group across all reachable locations and defaults
    async fn visible_keys(&mut self) -> Result<BTreeSet<FlatKey>, SettingsError> {
        self.ensure_open()?;
        let group = self.group.clone();
        let mut keys: BTreeSet<FlatKey> = self
            .defaults
            .keys()
            .filter_map(|key| key.relative_to(&group))
            .collect();

        for index in 0..self.locations.len() {
            let handle = match self.handle(index).await {
                Ok(handle) => handle,
                Err(BackendError::Unavailable { .. }) => continue,
                Err(e) => return Err(e.into()),
            };
            for key in handle.enumerate(&group).await? {
                if let Some(relative) = key.relative_to(&group) {
                    keys.insert(relative);
                }
            }
        }
        Ok(keys)
    }

    /// Cached handle for the location at `index` of the search order
    async fn handle(&mut self, index: usize) -> Result<&mut Box<dyn BackendHandle>, BackendError> {
        let location = self.locations[index].clone();
        let access = if location == self.locations[0] {
            Access::Primary
        } else {
            Access::ReadOnly
        };

        match self.handles.entry(location) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let handle = self.backend.open(entry.key(), access).await?;
                tracing::debug!(location = %entry.key(), ?access, "Opened settings location");
                Ok(entry.insert(handle))
            }
        }
    }
}

impl Drop for SettingsSession {
    fn drop(&mut self) {
        if self.is_open() && !self.handles.is_empty() {
            tracing::warn!(
                organization = self.identity.organization(),
                handles = self.handles.len(),
                "Settings session dropped while open; releasing handles without flush"
            );
        }
    }
}

impl std::fmt::Debug for SettingsSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsSession")
            .field("identity", &self.identity)
            .field("state", &self.state)
            .field("group", &self.group.to_string())
            .field("locations", &self.locations)
            .finish()
    }
}

/// Current group of a session, restored when dropped
///
/// Dereferences to the session so nested groups and reads go through it. Any
/// push or pop made through the guard is undone with it.
pub struct GroupGuard<'s> {
    session: &'s mut SettingsSession,
    prior: GroupPath,
}

impl Deref for GroupGuard<'_> {
    type Target = SettingsSession;

    fn deref(&self) -> &Self::Target {
        &*self.session
    }
}

impl DerefMut for GroupGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.session
    }
}

impl Drop for GroupGuard<'_> {
    fn drop(&mut self) {
        // close() already reset the group to the root
        if self.session.is_open() {
            self.session.group = std::mem::take(&mut self.prior);
        }
    }
}
