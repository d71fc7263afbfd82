//! Common test utilities and a shared scope fixture

#![allow(dead_code)]

use scoped_settings::{
    BackendRegistry, BaseScope, ComponentScope, FlatKey, Format, FormatBackend, Identity,
    InMemoryBackend, Location, ScopeDescriptor, SessionOptions, SettingsSession,
};
use std::sync::Arc;

pub const ORGANIZATION: &str = "myorg";
pub const APPLICATION: &str = "myapp";
pub const SUBSYSTEM: &str = "worker";

pub fn print_test_header(test_name: &str, purpose: &[&str]) {
    println!("\n🧪 TEST: {}", test_name);
    if let Some(first) = purpose.first() {
        println!("📋 PURPOSE: {}", first);
    }
    for line in purpose.iter().skip(1) {
        println!("   {}", line);
    }
}

pub fn key(key: &str) -> FlatKey {
    FlatKey::unflatten(key).expect("valid flat key")
}

/// `user:myorg/myapp`
pub fn app_identity(format: Format) -> Identity {
    Identity::user(format, ORGANIZATION, APPLICATION).expect("valid identity")
}

/// `user:myorg/myapp/worker`
pub fn subsystem_identity(format: Format) -> Identity {
    Identity::new(
        format,
        BaseScope::User,
        ORGANIZATION,
        Some(APPLICATION),
        Some(SUBSYSTEM),
    )
    .expect("valid identity")
}

/// In-memory backend plus helpers to reach each scope directly
pub struct MemoryFixture {
    pub backend: InMemoryBackend,
    pub registry: BackendRegistry,
}

impl MemoryFixture {
    pub fn new() -> Self {
        let backend = InMemoryBackend::new();
        let registry = BackendRegistry::new().with(Arc::new(backend.clone()));
        Self { backend, registry }
    }

    /// Descriptor of `myorg[/myapp[/worker]]` under `base`
    pub fn scope(&self, base: BaseScope, component: ComponentScope) -> ScopeDescriptor {
        subsystem_identity(Format::InMemory)
            .descriptor(base, component)
            .expect("fixture identity covers every component")
    }

    pub fn location(&self, base: BaseScope, component: ComponentScope) -> Location {
        self.backend.locate(&self.scope(base, component))
    }

    pub fn seed(&self, base: BaseScope, component: ComponentScope, flat_key: &str, value: &str) {
        self.backend
            .seed(&self.scope(base, component), &key(flat_key), value);
    }

    pub fn stored(&self, base: BaseScope, component: ComponentScope, flat_key: &str) -> Option<String> {
        self.backend
            .stored(&self.location(base, component), &key(flat_key))
    }

    pub fn session(&self, identity: Identity) -> SettingsSession {
        self.session_with(identity, SessionOptions::default())
    }

    pub fn session_with(&self, identity: Identity, options: SessionOptions) -> SettingsSession {
        SettingsSession::new(identity, &self.registry, options).expect("session for registered format")
    }

    /// Open session for `user:myorg/myapp`
    pub fn open_app_session(&self) -> SettingsSession {
        let mut session = self.session(app_identity(Format::InMemory));
        session.open().expect("open session");
        session
    }
}

impl Default for MemoryFixture {
    fn default() -> Self {
        Self::new()
    }
}
