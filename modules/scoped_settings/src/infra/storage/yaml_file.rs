//! YAML file format backend
//!
//! One file per scope:
//!
//! | Base scope | Component    | Path                                              |
//! |------------|--------------|---------------------------------------------------|
//! | system     | organization | `{system_root}/{org}/{org}.yaml`                  |
//! | system     | application  | `{system_root}/{org}/{app}.yaml`                  |
//! | system     | subsystem    | `{system_root}/{org}/{app}/{subsystem}.yaml`      |
//! | user       | organization | `{user_root}/.{org}/{org}.yaml`                   |
//! | user       | application  | `{user_root}/.{org}/{app}.yaml`                   |
//! | user       | subsystem    | `{user_root}/.{org}/{app}/{subsystem}.yaml`       |
//!
//! Groups are nested mappings. A sequence reads as one value with its items
//! joined by the list separator. Writes are buffered in the handle and written
//! on flush.

use crate::contract::{BaseScope, Format, Location, ScopeDescriptor};
use crate::domain::{Access, BackendError, BackendHandle, FlatKey, FormatBackend, GroupPath};
use async_trait::async_trait;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const EXTENSION: &str = "yaml";

pub const DEFAULT_SYSTEM_ROOT: &str = "/etc";

/// The home directory, or the working directory when it cannot be determined
pub fn default_user_root() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

#[derive(Debug, Clone)]
pub struct YamlFileBackend {
    system_root: PathBuf,
    user_root: PathBuf,
    list_separator: char,
}

impl YamlFileBackend {
    pub fn new(system_root: impl Into<PathBuf>, user_root: impl Into<PathBuf>) -> Self {
        Self {
            system_root: system_root.into(),
            user_root: user_root.into(),
            list_separator: ',',
        }
    }

    /// Separator used to join YAML sequences; match the session's list separator
    pub fn with_list_separator(mut self, list_separator: char) -> Self {
        self.list_separator = list_separator;
        self
    }

    /// `/etc` for system settings, the home directory for user settings
    pub fn with_default_roots() -> Self {
        Self::new(DEFAULT_SYSTEM_ROOT, default_user_root())
    }

    pub fn root(&self, base_scope: BaseScope) -> &Path {
        match base_scope {
            BaseScope::System => &self.system_root,
            BaseScope::User => &self.user_root,
        }
    }

    pub fn path_for(&self, scope: &ScopeDescriptor) -> PathBuf {
        let organization = scope.organization.as_str();
        let mut dir = match scope.base_scope {
            BaseScope::System => self.system_root.join(organization),
            BaseScope::User => self.user_root.join(format!(".{}", organization)),
        };
        let stem = match (&scope.application, &scope.subsystem) {
            (Some(application), Some(subsystem)) => {
                dir = dir.join(application);
                subsystem.as_str()
            }
            (Some(application), None) => application.as_str(),
            _ => organization,
        };
        dir.join(format!("{}.{}", stem, EXTENSION))
    }
}

#[async_trait]
impl FormatBackend for YamlFileBackend {
    fn format(&self) -> Format {
        Format::Yaml
    }

    fn locate(&self, scope: &ScopeDescriptor) -> Location {
        Location::new(self.path_for(scope).display().to_string())
    }

    async fn open(
        &self,
        location: &Location,
        access: Access,
    ) -> Result<Box<dyn BackendHandle>, BackendError> {
        let path = PathBuf::from(location.as_str());
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(text) => parse_document(location, &text, self.list_separator)?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(BackendError::Unavailable {
                    location: location.clone(),
                    reason: e.to_string(),
                })
            }
        };

        Ok(Box::new(YamlFileHandle {
            path,
            location: location.clone(),
            access,
            entries,
            dirty: false,
        }))
    }
}

struct YamlFileHandle {
    path: PathBuf,
    location: Location,
    access: Access,
    entries: BTreeMap<FlatKey, String>,
    dirty: bool,
}

impl YamlFileHandle {
    /// An entry that is a group of `key`, or a value where `key` needs a group
    fn clashing_entry(&self, key: &FlatKey) -> Option<&FlatKey> {
        let segments: Vec<&str> = key.segments().collect();
        self.entries.keys().find(|existing| {
            let other: Vec<&str> = existing.segments().collect();
            other.len() != segments.len()
                && (other.starts_with(&segments) || segments.starts_with(&other))
        })
    }
}

#[async_trait]
impl BackendHandle for YamlFileHandle {
    fn location(&self) -> &Location {
        &self.location
    }

    fn access(&self) -> Access {
        self.access
    }

    async fn get(&mut self, key: &FlatKey) -> Result<Option<String>, BackendError> {
        Ok(self.entries.get(key).cloned())
    }

    async fn set(&mut self, key: &FlatKey, value: &str) -> Result<(), BackendError> {
        self.ensure_writable()?;
        if let Some(existing) = self.clashing_entry(key) {
            return Err(malformed(
                &self.location,
                format!("'{}' clashes with existing '{}'", key, existing),
            ));
        }
        self.entries.insert(key.clone(), value.to_string());
        self.dirty = true;
        Ok(())
    }

    async fn remove(&mut self, key: &FlatKey) -> Result<(), BackendError> {
        self.ensure_writable()?;
        if self.entries.remove(key).is_some() {
            self.dirty = true;
        }
        Ok(())
    }

    async fn enumerate(&mut self, prefix: &GroupPath) -> Result<Vec<FlatKey>, BackendError> {
        Ok(self
            .entries
            .keys()
            .filter(|key| key.is_under(prefix))
            .cloned()
            .collect())
    }

    async fn flush(&mut self) -> Result<(), BackendError> {
        if !self.dirty {
            return Ok(());
        }
        let text = render_document(&self.location, &self.entries)?;
        write_atomically(&self.path, &text)
            .await
            .map_err(|e| io_error(&self.location, e))?;
        self.dirty = false;
        tracing::debug!(path = %self.path.display(), keys = self.entries.len(), "Wrote settings file");
        Ok(())
    }
}

fn io_error(location: &Location, err: std::io::Error) -> BackendError {
    if err.kind() == ErrorKind::PermissionDenied {
        BackendError::Unavailable {
            location: location.clone(),
            reason: err.to_string(),
        }
    } else {
        BackendError::Storage {
            location: location.clone(),
            source: err.into(),
        }
    }
}

async fn write_atomically(path: &Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);
    tokio::fs::write(&staging, text).await?;
    tokio::fs::rename(&staging, path).await
}

fn malformed(location: &Location, message: impl Into<String>) -> BackendError {
    BackendError::Malformed {
        location: location.clone(),
        message: message.into(),
    }
}

fn parse_document(
    location: &Location,
    text: &str,
    list_separator: char,
) -> Result<BTreeMap<FlatKey, String>, BackendError> {
    let mut entries = BTreeMap::new();
    if text.trim().is_empty() {
        return Ok(entries);
    }
    match serde_yaml::from_str::<Value>(text) {
        Ok(Value::Mapping(root)) => {
            flatten_mapping(location, &root, &GroupPath::root(), list_separator, &mut entries)?;
            Ok(entries)
        }
        Ok(Value::Null) => Ok(entries),
        Ok(_) => Err(malformed(location, "top level must be a mapping")),
        Err(e) => Err(malformed(location, e.to_string())),
    }
}

fn flatten_mapping(
    location: &Location,
    mapping: &Mapping,
    group: &GroupPath,
    list_separator: char,
    entries: &mut BTreeMap<FlatKey, String>,
) -> Result<(), BackendError> {
    for (name, value) in mapping {
        let name = scalar_to_string(name)
            .ok_or_else(|| malformed(location, format!("non-scalar key in group '{}'", group)))?;
        match value {
            Value::Mapping(child) => {
                let mut nested = group.clone();
                nested
                    .push(&name)
                    .map_err(|e| malformed(location, e.to_string()))?;
                flatten_mapping(location, child, &nested, list_separator, entries)?;
            }
            Value::Sequence(items) => {
                let items = items
                    .iter()
                    .map(scalar_to_string)
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| malformed(location, format!("nested list under '{}'", name)))?;
                let key = group
                    .flatten(&name)
                    .map_err(|e| malformed(location, e.to_string()))?;
                entries.insert(key, items.join(&list_separator.to_string()));
            }
            scalar => {
                let text = scalar_to_string(scalar)
                    .ok_or_else(|| malformed(location, format!("unsupported value for '{}'", name)))?;
                let key = group
                    .flatten(&name)
                    .map_err(|e| malformed(location, e.to_string()))?;
                entries.insert(key, text);
            }
        }
    }
    Ok(())
}

/// Blank values read as the empty string
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

fn render_document(
    location: &Location,
    entries: &BTreeMap<FlatKey, String>,
) -> Result<String, BackendError> {
    let mut root = Mapping::new();
    for (key, value) in entries {
        let segments: Vec<&str> = key.segments().collect();
        if !insert_nested(&mut root, &segments, value) {
            return Err(malformed(
                location,
                format!("'{}' is both a value and a group", key),
            ));
        }
    }
    serde_yaml::to_string(&Value::Mapping(root)).map_err(|e| BackendError::Storage {
        location: location.clone(),
        source: e.into(),
    })
}

fn insert_nested(mapping: &mut Mapping, segments: &[&str], value: &str) -> bool {
    match segments {
        [] => false,
        [leaf] => {
            let name = Value::String(leaf.to_string());
            if matches!(mapping.get(&name), Some(Value::Mapping(_))) {
                return false;
            }
            mapping.insert(name, Value::String(value.to_string()));
            true
        }
        [group, rest @ ..] => {
            let name = Value::String(group.to_string());
            if !mapping.contains_key(&name) {
                mapping.insert(name.clone(), Value::Mapping(Mapping::new()));
            }
            match mapping.get_mut(&name) {
                Some(Value::Mapping(child)) => insert_nested(child, rest, value),
                _ => false,
            }
        }
    }
}
