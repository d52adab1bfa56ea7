//! Domain-separated hash derivations.
//!
//! All derivations use SHA-256 with a per-collection prefix. This prevents
//! a hash computed for one collection from ever colliding with one computed
//! for another, even over the same underlying uid.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

// =============================================================================
// DOMAIN SEPARATION PREFIXES
// =============================================================================

/// Domain prefix for the interaction-collection hash (H_I).
pub const DOMAIN_INTERACTION: &[u8] = b"";
/// Domain prefix for the notification-collection hash (H_N).
pub const DOMAIN_NOTIFICATION: &[u8] = b"notification:";
/// Domain prefix for the report-collection hash (H_R).
pub const DOMAIN_REPORT: &[u8] = b"report:";
/// Domain prefix for the chain-path hash (H_C), applied over an H_I output.
pub const DOMAIN_CHAIN: &[u8] = b"chain:";

/// A 64-lowercase-hex-char SHA-256 digest, domain-separated by collection.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HashDigest([u8; 32]);

impl HashDigest {
    /// Render as the 64-character lowercase hex string stored on documents.
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    /// Parse a previously-rendered hex digest back into a `HashDigest`.
    pub fn from_hex(s: &str) -> Option<Self> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).ok()?;
        Some(Self(bytes))
    }
}

impl fmt::Display for HashDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// H_I(uid) = SHA256(upper(uid)), the interaction-collection identity hash.
///
/// Interaction discovery queries on this value; it is also the node identity
/// used throughout the chain propagator.
pub fn hash_interaction(uid: &str) -> HashDigest {
    domain_hash(DOMAIN_INTERACTION, uid.to_uppercase().as_bytes())
}

/// H_N(uid) = SHA256("notification:" + upper(uid)).
pub fn hash_notification(uid: &str) -> HashDigest {
    domain_hash(DOMAIN_NOTIFICATION, uid.to_uppercase().as_bytes())
}

/// H_R(uid) = SHA256("report:" + upper(uid)).
pub fn hash_report(uid: &str) -> HashDigest {
    domain_hash(DOMAIN_REPORT, uid.to_uppercase().as_bytes())
}

/// H_C(h) = SHA256("chain:" + h) where `h` is an already-computed H_I digest.
///
/// Callers must pass the *hex rendering* of an `H_I` output, never a raw uid.
/// `chainPath` entries are `H_C(H_I(uid))`, not `H_C(uid)`.
pub fn hash_chain(hashed_interaction_id: HashDigest) -> HashDigest {
    domain_hash(DOMAIN_CHAIN, hashed_interaction_id.to_hex().as_bytes())
}

fn domain_hash(domain: &[u8], payload: &[u8]) -> HashDigest {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(payload);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    HashDigest(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_separation_is_pairwise_distinct() {
        let uid = "user-42";
        let i = hash_interaction(uid);
        let n = hash_notification(uid);
        let r = hash_report(uid);
        let c = hash_chain(i);

        let all = [i, n, r, c];
        for a in 0..all.len() {
            for b in (a + 1)..all.len() {
                assert_ne!(all[a], all[b], "hash domains must be pairwise distinct");
            }
        }
    }

    #[test]
    fn output_is_64_lowercase_hex_chars() {
        let h = hash_interaction("anyone");
        let hex = h.to_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn deterministic() {
        assert_eq!(hash_interaction("A"), hash_interaction("a"));
        assert_eq!(hash_notification("A"), hash_notification("a"));
        assert_eq!(hash_report("A"), hash_report("a"));
    }

    #[test]
    fn chain_hash_is_over_the_interaction_hash_not_the_raw_uid() {
        let uid = "B";
        let via_interaction_hash = hash_chain(hash_interaction(uid));
        let via_raw_uid = domain_hash(DOMAIN_CHAIN, uid.to_uppercase().as_bytes());
        assert_ne!(via_interaction_hash, via_raw_uid);
    }

    #[test]
    fn hex_roundtrip() {
        let h = hash_interaction("round-trip");
        let hex = h.to_hex();
        assert_eq!(HashDigest::from_hex(&hex), Some(h));
    }
}
