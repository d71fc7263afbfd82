//! Contract models for scoped settings
//!
//! These models are storage-agnostic and shared by the resolver, the session
//! and every format backend.

use super::error::SettingsError;
use std::fmt;

/// Top-level partition of settings storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BaseScope {
    /// System-wide settings
    System,
    /// Settings of the current user
    User,
}

impl BaseScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
        }
    }
}

impl fmt::Display for BaseScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Component level of an identity, least specific first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentScope {
    Organization,
    Application,
    Subsystem,
}

impl ComponentScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Organization => "organization",
            Self::Application => "application",
            Self::Subsystem => "subsystem",
        }
    }

    /// Less specific component scopes, most specific first
    pub fn greater(&self) -> &'static [ComponentScope] {
        match self {
            Self::Subsystem => &[Self::Application, Self::Organization],
            Self::Application => &[Self::Organization],
            Self::Organization => &[],
        }
    }
}

impl fmt::Display for ComponentScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage format used to select a backend
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Format {
    /// Volatile process-local storage
    InMemory,
    /// One YAML file per scope
    Yaml,
    /// Rows in a relational database
    Database,
    /// Externally provided backend
    Custom(String),
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InMemory => f.write_str("inmemory"),
            Self::Yaml => f.write_str("yaml"),
            Self::Database => f.write_str("database"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

/// Logical identity of a settings session
///
/// The organization is always present; a subsystem requires an application.
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    format: Format,
    base_scope: BaseScope,
    organization: String,
    application: Option<String>,
    subsystem: Option<String>,
}

impl Identity {
    /// Create a validated identity
    pub fn new(
        format: Format,
        base_scope: BaseScope,
        organization: impl Into<String>,
        application: Option<&str>,
        subsystem: Option<&str>,
    ) -> Result<Self, SettingsError> {
        let organization = organization.into();
        if organization.is_empty() {
            return Err(SettingsError::InvalidIdentity {
                reason: "organization must be a non-empty string".to_string(),
            });
        }
        if application.is_none() && subsystem.is_some() {
            return Err(SettingsError::InvalidIdentity {
                reason: "a subsystem requires an application".to_string(),
            });
        }
        for (label, component) in [("application", application), ("subsystem", subsystem)] {
            if component == Some("") {
                return Err(SettingsError::InvalidIdentity {
                    reason: format!("{} must be a non-empty string when given", label),
                });
            }
        }

        Ok(Self {
            format,
            base_scope,
            organization,
            application: application.map(str::to_string),
            subsystem: subsystem.map(str::to_string),
        })
    }

    /// User-scoped identity for an organization and application
    pub fn user(
        format: Format,
        organization: impl Into<String>,
        application: &str,
    ) -> Result<Self, SettingsError> {
        Self::new(format, BaseScope::User, organization, Some(application), None)
    }

    pub fn format(&self) -> &Format {
        &self.format
    }

    pub fn base_scope(&self) -> BaseScope {
        self.base_scope
    }

    pub fn organization(&self) -> &str {
        &self.organization
    }

    pub fn application(&self) -> Option<&str> {
        self.application.as_deref()
    }

    pub fn subsystem(&self) -> Option<&str> {
        self.subsystem.as_deref()
    }

    /// The most specific component present
    pub fn component_scope(&self) -> ComponentScope {
        if self.subsystem.is_some() {
            ComponentScope::Subsystem
        } else if self.application.is_some() {
            ComponentScope::Application
        } else {
            ComponentScope::Organization
        }
    }

    /// Descriptor of one component level of this identity under `base_scope`.
    ///
    /// Returns `None` when the identity has no such component.
    pub fn descriptor(
        &self,
        base_scope: BaseScope,
        component: ComponentScope,
    ) -> Option<ScopeDescriptor> {
        if component > self.component_scope() {
            return None;
        }
        let application = match component {
            ComponentScope::Organization => None,
            _ => self.application.clone(),
        };
        let subsystem = match component {
            ComponentScope::Subsystem => self.subsystem.clone(),
            _ => None,
        };
        Some(ScopeDescriptor {
            base_scope,
            organization: self.organization.clone(),
            application,
            subsystem,
        })
    }
}

/// One fully resolved level of the component-scope chain
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeDescriptor {
    pub base_scope: BaseScope,
    pub organization: String,
    pub application: Option<String>,
    pub subsystem: Option<String>,
}

impl ScopeDescriptor {
    pub fn component_scope(&self) -> ComponentScope {
        if self.subsystem.is_some() {
            ComponentScope::Subsystem
        } else if self.application.is_some() {
            ComponentScope::Application
        } else {
            ComponentScope::Organization
        }
    }

    /// Organization, application and subsystem names that are present, in order
    pub fn components(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.organization.as_str())
            .chain(self.application.as_deref())
            .chain(self.subsystem.as_deref())
    }
}

impl fmt::Display for ScopeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.base_scope)?;
        let components: Vec<&str> = self.components().collect();
        f.write_str(&components.join("/"))
    }
}

/// A scope in search order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedScope {
    pub descriptor: ScopeDescriptor,
    /// Whether this is the write target of the session
    pub is_primary: bool,
}

/// Backend-specific physical location identifier (path, table partition, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location(String);

impl Location {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
