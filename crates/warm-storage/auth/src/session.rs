//! Session key delegation

use alloy_primitives::{Address, B256};
use std::collections::HashMap;
use warm_storage_primitives::Epoch;

/// Lookup of delegated signing authority
pub trait SessionKeyRegistry {
    /// Epoch until which `signer` may sign messages of `permission` type on
    /// behalf of `owner`, zero if never authorized
    fn authorization_expiry(&self, owner: Address, signer: Address, permission: B256) -> Epoch;
}

/// Session key registry held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionKeys {
    expiries: HashMap<(Address, Address, B256), Epoch>,
}

impl InMemorySessionKeys {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Authorize `signer` for each of `permissions` until `expiry`
    pub fn login(
        &mut self,
        owner: Address,
        signer: Address,
        permissions: impl IntoIterator<Item = B256>,
        expiry: Epoch,
    ) {
        for permission in permissions {
            self.expiries.insert((owner, signer, permission), expiry);
        }
    }

    /// Revoke `signer` for each of `permissions`
    pub fn revoke(
        &mut self,
        owner: Address,
        signer: Address,
        permissions: impl IntoIterator<Item = B256>,
    ) {
        for permission in permissions {
            self.expiries.remove(&(owner, signer, permission));
        }
    }
}

impl SessionKeyRegistry for InMemorySessionKeys {
    fn authorization_expiry(&self, owner: Address, signer: Address, permission: B256) -> Epoch {
        self.expiries.get(&(owner, signer, permission)).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_and_revoke() {
        let owner = Address::repeat_byte(1);
        let signer = Address::repeat_byte(2);
        let permission = B256::repeat_byte(3);
        let mut keys = InMemorySessionKeys::new();

        assert_eq!(keys.authorization_expiry(owner, signer, permission), 0);
        keys.login(owner, signer, [permission], 500);
        assert_eq!(keys.authorization_expiry(owner, signer, permission), 500);
        assert_eq!(keys.authorization_expiry(signer, owner, permission), 0);

        keys.revoke(owner, signer, [permission]);
        assert_eq!(keys.authorization_expiry(owner, signer, permission), 0);
    }
}
