//! Chain constants and RPC endpoint defaults.
use std::env;

/// Chain id of a local development node.
pub const LOCALHOST_CHAIN_ID: u64 = 31337;

/// Chain id of the Sepolia testnet.
pub const SEPOLIA_CHAIN_ID: u64 = 11155111;

/// Substrings identifying a wallet or RPC endpoint that cannot be reached.
const TRANSPORT_FAILURE_PATTERNS: [&str; 4] = [
    "Failed to fetch",
    "code\": -32603",
    "connection refused",
    "error sending request",
];

/// Get the Sepolia RPC URL.
pub fn get_sepolia_url() -> String {
    env::var("SEPOLIA_RPC_URL")
        .unwrap_or("https://ethereum-sepolia-rpc.publicnode.com".to_string())
}

/// Get the URL of the local development node.
pub fn get_localhost_url() -> String {
    env::var("LOCALHOST_RPC_URL").unwrap_or("http://127.0.0.1:8545".to_string())
}

/// Default RPC endpoint for a known chain.
pub fn default_rpc_url(chain_id: u64) -> Option<String> {
    match chain_id {
        LOCALHOST_CHAIN_ID => Some(get_localhost_url()),
        SEPOLIA_CHAIN_ID => Some(get_sepolia_url()),
        _ => None,
    }
}

/// Human-readable name of a known chain.
pub fn chain_name(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        LOCALHOST_CHAIN_ID => Some("Localhost"),
        SEPOLIA_CHAIN_ID => Some("Sepolia"),
        _ => None,
    }
}

/// Whether an error message reports an unreachable endpoint rather than a
/// failure of the request itself.
pub fn is_transport_failure(msg: &str) -> bool {
    TRANSPORT_FAILURE_PATTERNS
        .iter()
        .any(|pattern| msg.contains(pattern))
}
