//! Well-known development accounts, the same ones local Ethereum nodes
//! pre-fund.
use alloy::signers::local::PrivateKeySigner;

pub const DEV_PRIVATE_KEYS: [&str; 3] = [
    "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
    "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
    "5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a",
];

/// Signer of the `index`-th development account.
pub fn dev_signer(index: usize) -> Option<PrivateKeySigner> {
    DEV_PRIVATE_KEYS.get(index)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    #[test]
    fn first_account_is_the_usual_deployer() {
        let signer = dev_signer(0).unwrap();
        assert_eq!(
            signer.address(),
            address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266")
        );
        assert!(dev_signer(3).is_none());
    }
}
