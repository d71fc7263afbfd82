//! Domain layer - scope resolution, backend traits and sessions

pub mod backend;
pub mod coercion;
pub mod group_path;
pub mod resolver;
pub mod session;

pub use backend::{Access, BackendError, BackendHandle, BackendRegistry, FormatBackend};
pub use coercion::SettingValue;
pub use group_path::{FlatKey, GroupPath, SEPARATOR};
pub use resolver::{FallbackPolicy, ScopeResolver};
pub use session::{GroupGuard, SessionOptions, SettingsSession};
