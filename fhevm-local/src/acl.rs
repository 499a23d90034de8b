use std::collections::{BTreeSet, HashMap};

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use shield_common::Handle;

/// Access control list: which accounts and contracts may use a handle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    permissions: HashMap<Handle, BTreeSet<Address>>,
}

impl Acl {
    pub fn allow(&mut self, handle: Handle, account: Address) {
        self.permissions.entry(handle).or_default().insert(account);
    }

    pub fn is_allowed(&self, handle: &Handle, account: &Address) -> bool {
        self.permissions
            .get(handle)
            .is_some_and(|allowed| allowed.contains(account))
    }

    /// Accounts allowed on `handle`.
    pub fn allowed(&self, handle: &Handle) -> impl Iterator<Item = &Address> {
        self.permissions.get(handle).into_iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::keccak256;

    #[test]
    fn grants_are_per_handle_and_account() {
        let mut acl = Acl::default();
        let (h1, h2) = (keccak256(b"1"), keccak256(b"2"));
        let alice = Address::repeat_byte(0xa1);

        acl.allow(h1, alice);
        assert!(acl.is_allowed(&h1, &alice));
        assert!(!acl.is_allowed(&h2, &alice));
        assert!(!acl.is_allowed(&h1, &Address::repeat_byte(0xb0)));

        acl.allow(h1, alice);
        assert_eq!(acl.allowed(&h1).count(), 1);
    }
}
