//! Contract layer - public model shared by sessions and backends
//!
//! This layer contains storage-agnostic models and the error taxonomy.

pub mod error;
pub mod model;

pub use error::SettingsError;
pub use model::{
    BaseScope, ComponentScope, Format, Identity, Location, ResolvedScope, ScopeDescriptor,
};
