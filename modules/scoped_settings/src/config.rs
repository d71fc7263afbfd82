//! Configuration for scoped settings

use crate::contract::{ComponentScope, SettingsError};
use crate::domain::{FallbackPolicy, FlatKey, GroupPath, SessionOptions};
use crate::infra::storage::yaml_file::{default_user_root, YamlFileBackend, DEFAULT_SYSTEM_ROOT};
use figment::providers::{Env, Format as _, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variable prefix, nested keys separated by `__`
pub const ENV_PREFIX: &str = "SCOPED_SETTINGS_";

/// Scoped settings configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Fall back from user to system settings
    #[serde(default = "default_true")]
    pub base_scope_fallback: bool,

    /// Fallback between component scopes
    #[serde(default)]
    pub component_fallback: ComponentFallback,

    /// Separator between list items
    #[serde(default = "default_list_separator")]
    pub list_separator: char,

    /// Root of system-wide YAML settings (defaults to `/etc`)
    #[serde(default)]
    pub system_root: Option<PathBuf>,

    /// Root of per-user YAML settings (defaults to the home directory)
    #[serde(default)]
    pub user_root: Option<PathBuf>,

    /// Default values as nested groups
    #[serde(default)]
    pub defaults: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentFallback {
    #[serde(default = "default_true")]
    pub subsystem_to_application: bool,
    #[serde(default = "default_true")]
    pub subsystem_to_organization: bool,
    #[serde(default = "default_true")]
    pub application_to_organization: bool,
}

impl Default for ComponentFallback {
    fn default() -> Self {
        Self {
            subsystem_to_application: true,
            subsystem_to_organization: true,
            application_to_organization: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_scope_fallback: true,
            component_fallback: ComponentFallback::default(),
            list_separator: default_list_separator(),
            system_root: None,
            user_root: None,
            defaults: serde_json::Map::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_list_separator() -> char {
    ','
}

impl Config {
    /// Built-in defaults, then `path` if given, then `SCOPED_SETTINGS_*` variables
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    /// Parse a YAML document over the built-in defaults
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::string(yaml))
            .extract()?;
        Ok(config)
    }

    pub fn fallback_policy(&self) -> Result<FallbackPolicy, SettingsError> {
        use ComponentScope::*;

        let mut policy =
            FallbackPolicy::default().with_base_scope_fallback(self.base_scope_fallback);
        let pairs = [
            (Subsystem, Application, self.component_fallback.subsystem_to_application),
            (Subsystem, Organization, self.component_fallback.subsystem_to_organization),
            (Application, Organization, self.component_fallback.application_to_organization),
        ];
        for (lesser, greater, enabled) in pairs {
            policy.set_component_fallback(lesser, greater, enabled)?;
        }
        Ok(policy)
    }

    /// Session options with the nested defaults flattened
    pub fn session_options(&self) -> Result<SessionOptions, SettingsError> {
        let mut defaults = BTreeMap::new();
        flatten_defaults(&self.defaults, &GroupPath::root(), self.list_separator, &mut defaults)?;
        Ok(SessionOptions {
            policy: self.fallback_policy()?,
            list_separator: self.list_separator,
            defaults,
        })
    }

    /// YAML backend rooted at the configured directories
    pub fn yaml_backend(&self) -> YamlFileBackend {
        let system_root = self
            .system_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SYSTEM_ROOT));
        let user_root = self.user_root.clone().unwrap_or_else(default_user_root);
        YamlFileBackend::new(system_root, user_root).with_list_separator(self.list_separator)
    }
}

fn flatten_defaults(
    values: &serde_json::Map<String, serde_json::Value>,
    group: &GroupPath,
    list_separator: char,
    out: &mut BTreeMap<FlatKey, String>,
) -> Result<(), SettingsError> {
    use serde_json::Value;

    for (name, value) in values {
        match value {
            Value::Object(children) => {
                let mut nested = group.clone();
                nested.push(name)?;
                flatten_defaults(children, &nested, list_separator, out)?;
            }
            Value::String(s) => {
                out.insert(group.flatten(name)?, s.clone());
            }
            Value::Null => {
                out.insert(group.flatten(name)?, String::new());
            }
            Value::Array(items) => {
                let items: Vec<String> = items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect();
                out.insert(group.flatten(name)?, items.join(&list_separator.to_string()));
            }
            other => {
                out.insert(group.flatten(name)?, other.to_string());
            }
        }
    }
    Ok(())
}
