//! One-way hashing and random tokens

use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// SHA-256 of `value`, hex encoded
pub fn hash(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// Compare `value` against a stored hash in constant time
pub fn compare_hash(value: &str, hashed: &str) -> bool {
    let computed = hash(value);
    if computed.len() != hashed.len() {
        return false;
    }
    computed.as_bytes().ct_eq(hashed.as_bytes()).into()
}

/// `len` random bytes from the OS generator, hex encoded
pub fn generate_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
