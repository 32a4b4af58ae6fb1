//! PII masking for transaction names
//!
//! Names are replaced by their SHA-256 digest before anything is cached or
//! handed to the agent. Classification always runs on the raw names first.

use sha2::{Digest, Sha256};

/// One-way, deterministic mask of a free-text name (64 hex chars)
pub fn mask_pii(name: &str) -> String {
    hex::encode(Sha256::digest(name.as_bytes()))
}
