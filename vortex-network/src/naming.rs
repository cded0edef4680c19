//! Bridge name derivation.
//!
//! The external device name is `<type>-<hash>` where `<hash>` is the first
//! [`BRIDGE_HASH_LEN`] lowercase hex digits of `sha256("<type>:<name>")`.
//! Every result fits in a Linux interface name (15 bytes), and the same
//! (type, name) pair always yields the same device name.

use sha2::{Digest, Sha256};

use crate::types::{NetworkType, MAX_IFACE_NAME_LEN};

/// Number of hex digits of the digest kept in the bridge name.
pub const BRIDGE_HASH_LEN: usize = 8;

/// Derive the external bridge name for a network.
pub fn generate_bridge_name(network_type: NetworkType, name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(network_type.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(name.as_bytes());
    let digest = hex::encode(hasher.finalize());

    let bridge = format!("{}-{}", network_type.as_str(), &digest[..BRIDGE_HASH_LEN]);
    debug_assert!(bridge.len() <= MAX_IFACE_NAME_LEN);
    bridge
}
