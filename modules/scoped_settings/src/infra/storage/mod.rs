//! Storage layer - concrete format backends

pub mod database;
pub mod entity;
pub mod memory;
pub mod migrations;
pub mod yaml_file;

pub use database::DatabaseBackend;
pub use memory::InMemoryBackend;
pub use yaml_file::YamlFileBackend;

use crate::contract::ScopeDescriptor;

/// `{base}/{organization}[/{application}[/{subsystem}]]`
pub(crate) fn scope_path(scope: &ScopeDescriptor) -> String {
    std::iter::once(scope.base_scope.as_str())
        .chain(scope.components())
        .collect::<Vec<_>>()
        .join("/")
}
