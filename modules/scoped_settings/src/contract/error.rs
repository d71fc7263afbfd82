//! Contract error types for scoped settings
//!
//! Every error a caller can observe from a session, an identity or the
//! resolver. Backends report [`BackendError`](crate::domain::BackendError),
//! which converts into this taxonomy one-to-one.

use super::model::{ComponentScope, Format, Location};

/// Scoped settings errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// Malformed identity at construction
    #[error("Invalid identity: {reason}")]
    InvalidIdentity { reason: String },

    /// No backend registered for the identity's format
    #[error("Unregistered settings format: {0}")]
    UnregisteredFormat(Format),

    /// Group or key name that cannot be flattened
    #[error("Invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// Group pop with nothing pushed
    #[error("Group stack is empty")]
    EmptyStack,

    /// Operation issued on a closed session
    #[error("Settings session is closed")]
    SessionClosed,

    /// A backend cannot open a location
    #[error("Settings location unavailable: {location}: {reason}")]
    LocationUnavailable { location: Location, reason: String },

    /// A location exists but its contents cannot be interpreted
    #[error("Malformed settings at {location}: {message}")]
    MalformedLocation { location: Location, message: String },

    /// A required setting was found nowhere in the search order
    #[error("Missing required {value_type} value for '{key}' in {}", display_locations(.locations))]
    RequiredSettingMissing {
        key: String,
        value_type: &'static str,
        locations: Vec<Location>,
    },

    /// A found value cannot be converted to the requested type
    #[error("Invalid {value_type} value '{value}' for '{key}': {message}")]
    TypeCoercion {
        key: String,
        value: String,
        value_type: &'static str,
        message: String,
    },

    /// Write attempted through a handle that is not the primary location's
    #[error("Settings location is read-only for this session: {location}")]
    ReadOnlyScope { location: Location },

    /// Fallback between two component scopes that are not ordered lesser → greater
    #[error("Invalid component fallback pair: {lesser} -> {greater}")]
    InvalidFallbackPair {
        lesser: ComponentScope,
        greater: ComponentScope,
    },

    /// Storage driver failure
    #[error("Settings storage failure at {location}")]
    Storage {
        location: Location,
        #[source]
        source: anyhow::Error,
    },
}

fn display_locations(locations: &[Location]) -> String {
    let locations: Vec<&str> = locations.iter().map(Location::as_str).collect();
    format!("[{}]", locations.join(", "))
}
