//! Master secret

use crate::EncryptionError;
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Master secret, normalized and zeroized on drop.
///
/// The raw secret is reduced to the first 32 hex characters of its SHA-256
/// digest, and that string is the PBKDF2 password.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterSecret {
    password: String,
}

impl MasterSecret {
    /// Normalize a raw secret
    pub fn new(raw: &str) -> Result<Self, EncryptionError> {
        if raw.trim().is_empty() {
            return Err(EncryptionError::MissingSecret);
        }
        let mut digest = hex::encode(Sha256::digest(raw.as_bytes()));
        let password = digest[..32].to_string();
        digest.zeroize();
        Ok(Self { password })
    }

    pub(crate) fn password(&self) -> &[u8] {
        self.password.as_bytes()
    }
}

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterSecret(<redacted>)")
    }
}
