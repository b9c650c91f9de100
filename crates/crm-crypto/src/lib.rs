//! CRM Trust Core - Field Encryption
//!
//! Authenticated encryption of individual PII fields at rest:
//! - Per-value random salt and IV, key derived from one master secret
//! - AES-256-GCM with a 16-byte nonce and 16-byte tag
//! - One opaque base64 blob per field
//!
//! # Blob layout
//!
//! ```text
//! ┌────────────┬──────────┬──────────┬──────────────────┐
//! │ salt (64)  │  iv (16) │ tag (16) │ ciphertext (n)   │  → base64
//! └────────────┴──────────┴──────────┴──────────────────┘
//!       │
//!       ▼
//!  PBKDF2-HMAC-SHA512(master, salt) → 32-byte key
//! ```
//!
//! Masking and hashing helpers for display and lookup live alongside.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod digest;
pub mod encryptor;
pub mod mask;
pub mod secret;

pub use digest::{compare_hash, generate_token, hash};
pub use encryptor::{EncryptedBlob, FieldEncryptor, DEFAULT_KDF_ITERATIONS};
pub use mask::{mask_sensitive_data, MaskKind};
pub use secret::MasterSecret;

use thiserror::Error;

/// Encryption errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncryptionError {
    /// Master secret missing or empty
    #[error("master secret is missing or empty")]
    MissingSecret,

    /// Key derivation iteration count is unusable
    #[error("invalid key derivation iteration count: {0}")]
    InvalidIterations(u32),

    /// Cipher refused the operation
    #[error("encryption failed")]
    Cipher,

    /// Structured value could not be serialized
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Key derivation exceeded its time bound
    #[error("key derivation timed out after {0} ms")]
    Timeout(u64),

    /// Blocking task was cancelled or panicked
    #[error("blocking task failed: {0}")]
    Task(String),
}
