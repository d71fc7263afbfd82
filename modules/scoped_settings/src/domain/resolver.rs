//! Scope resolution - the ordered list of scopes a session searches
//!
//! The primary scope (most specific component in the identity's base scope)
//! always comes first. Greater component scopes of the same base scope follow,
//! most specific first. A `user` identity then repeats the whole chain under
//! `system`. All user-scope levels are exhausted before any system-scope level.

use crate::contract::{BaseScope, ComponentScope, Identity, ResolvedScope, SettingsError};

/// Which fallbacks a resolver follows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackPolicy {
    /// Whether a `user` identity falls back to `system`
    pub base_scope_fallback: bool,
    subsystem_to_application: bool,
    subsystem_to_organization: bool,
    application_to_organization: bool,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            base_scope_fallback: true,
            subsystem_to_application: true,
            subsystem_to_organization: true,
            application_to_organization: true,
        }
    }
}

impl FallbackPolicy {
    pub fn with_base_scope_fallback(mut self, enabled: bool) -> Self {
        self.base_scope_fallback = enabled;
        self
    }

    /// Whether a key missing in `lesser` is looked up in `greater`
    pub fn component_fallback(
        &self,
        lesser: ComponentScope,
        greater: ComponentScope,
    ) -> Result<bool, SettingsError> {
        Ok(*self.pair(lesser, greater)?)
    }

    pub fn set_component_fallback(
        &mut self,
        lesser: ComponentScope,
        greater: ComponentScope,
        enabled: bool,
    ) -> Result<(), SettingsError> {
        *self.pair_mut(lesser, greater)? = enabled;
        Ok(())
    }

    fn pair(&self, lesser: ComponentScope, greater: ComponentScope) -> Result<&bool, SettingsError> {
        use ComponentScope::*;
        match (lesser, greater) {
            (Subsystem, Application) => Ok(&self.subsystem_to_application),
            (Subsystem, Organization) => Ok(&self.subsystem_to_organization),
            (Application, Organization) => Ok(&self.application_to_organization),
            _ => Err(SettingsError::InvalidFallbackPair { lesser, greater }),
        }
    }

    fn pair_mut(
        &mut self,
        lesser: ComponentScope,
        greater: ComponentScope,
    ) -> Result<&mut bool, SettingsError> {
        use ComponentScope::*;
        match (lesser, greater) {
            (Subsystem, Application) => Ok(&mut self.subsystem_to_application),
            (Subsystem, Organization) => Ok(&mut self.subsystem_to_organization),
            (Application, Organization) => Ok(&mut self.application_to_organization),
            _ => Err(SettingsError::InvalidFallbackPair { lesser, greater }),
        }
    }
}

/// Produces the search order for an identity
#[derive(Debug, Clone, Default)]
pub struct ScopeResolver {
    policy: FallbackPolicy,
}

impl ScopeResolver {
    pub fn new(policy: FallbackPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &FallbackPolicy {
        &self.policy
    }

    /// Ordered scopes to search; element 0 is the primary
    pub fn resolve(&self, identity: &Identity) -> Vec<ResolvedScope> {
        let primary = identity.component_scope();

        // Components searched within one base scope, most specific first
        let chain: Vec<ComponentScope> = std::iter::once(primary)
            .chain(
                primary
                    .greater()
                    .iter()
                    .copied()
                    .filter(|greater| self.follows(primary, *greater)),
            )
            .collect();

        let mut base_scopes = vec![identity.base_scope()];
        if identity.base_scope() == BaseScope::User && self.policy.base_scope_fallback {
            base_scopes.push(BaseScope::System);
        }

        let scopes: Vec<ResolvedScope> = base_scopes
            .iter()
            .flat_map(|base| chain.iter().map(move |component| (*base, *component)))
            .filter_map(|(base, component)| identity.descriptor(base, component))
            .enumerate()
            .map(|(index, descriptor)| ResolvedScope {
                descriptor,
                is_primary: index == 0,
            })
            .collect();

        tracing::debug!(
            search_order = ?scopes.iter().map(|s| s.descriptor.to_string()).collect::<Vec<_>>(),
            "Resolved settings scopes"
        );
        scopes
    }

    fn follows(&self, lesser: ComponentScope, greater: ComponentScope) -> bool {
        // greater() only yields valid pairs
        self.policy.component_fallback(lesser, greater).unwrap_or(false)
    }
}
