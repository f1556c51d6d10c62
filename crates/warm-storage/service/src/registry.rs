//! Service provider registry boundary

use alloy_primitives::Address;
use std::collections::HashMap;
use warm_storage_primitives::ProviderId;

/// Registered provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    /// Address operating the proof verifier side
    pub service_provider: Address,
    /// Address receiving storage payments
    pub payee: Address,
    /// Whether the registration is active
    pub is_active: bool,
}

/// Provider registry lookups
pub trait ProviderRegistry {
    /// Provider id registered for `service_provider`
    fn provider_id(&self, service_provider: Address) -> Option<ProviderId>;

    /// Payee of `provider_id`
    fn payee(&self, provider_id: ProviderId) -> Option<Address>;

    /// Whether `provider_id` is registered and active
    fn is_active(&self, provider_id: ProviderId) -> bool;
}

/// Provider registry held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryProviderRegistry {
    next_id: ProviderId,
    providers: HashMap<ProviderId, ProviderInfo>,
    by_address: HashMap<Address, ProviderId>,
}

impl InMemoryProviderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an active provider, returning its id
    ///
    /// Re-registering an address returns the existing id.
    pub fn register(&mut self, service_provider: Address, payee: Address) -> ProviderId {
        if let Some(id) = self.by_address.get(&service_provider) {
            return *id;
        }
        self.next_id += 1;
        let id = self.next_id;
        self.providers.insert(id, ProviderInfo { service_provider, payee, is_active: true });
        self.by_address.insert(service_provider, id);
        id
    }

    /// Mark a provider inactive
    pub fn deactivate(&mut self, provider_id: ProviderId) {
        if let Some(info) = self.providers.get_mut(&provider_id) {
            info.is_active = false;
        }
    }

    /// Registration of `provider_id`
    pub fn provider(&self, provider_id: ProviderId) -> Option<&ProviderInfo> {
        self.providers.get(&provider_id)
    }
}

impl ProviderRegistry for InMemoryProviderRegistry {
    fn provider_id(&self, service_provider: Address) -> Option<ProviderId> {
        self.by_address.get(&service_provider).copied()
    }

    fn payee(&self, provider_id: ProviderId) -> Option<Address> {
        self.providers.get(&provider_id).map(|info| info.payee)
    }

    fn is_active(&self, provider_id: ProviderId) -> bool {
        self.providers.get(&provider_id).is_some_and(|info| info.is_active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_deactivate() {
        let mut registry = InMemoryProviderRegistry::new();
        let id = registry.register(Address::repeat_byte(1), Address::repeat_byte(2));

        assert_eq!(registry.register(Address::repeat_byte(1), Address::repeat_byte(3)), id);
        assert_eq!(registry.provider_id(Address::repeat_byte(1)), Some(id));
        assert_eq!(registry.payee(id), Some(Address::repeat_byte(2)));
        assert!(registry.is_active(id));

        registry.deactivate(id);
        assert!(!registry.is_active(id));
        assert!(!registry.is_active(id + 1));
    }
}
