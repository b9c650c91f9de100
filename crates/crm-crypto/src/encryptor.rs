//! Field encryptor

use crate::secret::MasterSecret;
use crate::EncryptionError;
use aes_gcm::{
    aead::{consts::U16, AeadInPlace, KeyInit},
    aes::Aes256,
    AesGcm, Nonce, Tag,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha512;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use zeroize::Zeroizing;

/// AES-256-GCM with a 16-byte nonce
type FieldCipher = AesGcm<Aes256, U16>;

const SALT_LEN: usize = 64;
const IV_LEN: usize = 16;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;
const HEADER_LEN: usize = SALT_LEN + IV_LEN + TAG_LEN;

/// Default PBKDF2 iteration count
pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;

const DEFAULT_KDF_TIMEOUT: Duration = Duration::from_secs(5);

/// Stored ciphertext: base64 of `salt ‖ iv ‖ tag ‖ ciphertext`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedBlob(String);

impl EncryptedBlob {
    /// Wrap a value read back from storage
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Base64 text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base64 text, owned
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for EncryptedBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<EncryptedBlob> for String {
    fn from(blob: EncryptedBlob) -> Self {
        blob.0
    }
}

/// Encrypts and decrypts individual fields under one master secret
#[derive(Debug, Clone)]
pub struct FieldEncryptor {
    secret: Arc<MasterSecret>,
    iterations: u32,
    kdf_timeout: Duration,
}

impl FieldEncryptor {
    /// Create an encryptor
    pub fn new(secret: MasterSecret, iterations: u32) -> Result<Self, EncryptionError> {
        if iterations == 0 {
            return Err(EncryptionError::InvalidIterations(iterations));
        }
        Ok(Self { secret: Arc::new(secret), iterations, kdf_timeout: DEFAULT_KDF_TIMEOUT })
    }

    /// Bound on the async variants
    pub fn with_kdf_timeout(mut self, timeout: Duration) -> Self {
        self.kdf_timeout = timeout;
        self
    }

    /// PBKDF2 iteration count
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Encrypt an optional value. `None` stays `None`.
    pub fn encrypt(&self, plaintext: Option<&str>) -> Result<Option<EncryptedBlob>, EncryptionError> {
        plaintext.map(|p| self.encrypt_str(p)).transpose()
    }

    /// Encrypt a value with a fresh salt and IV
    pub fn encrypt_str(&self, plaintext: &str) -> Result<EncryptedBlob, EncryptionError> {
        let mut salt = [0u8; SALT_LEN];
        let mut iv = [0u8; IV_LEN];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        rand::rngs::OsRng.fill_bytes(&mut iv);

        let key = self.derive_key(&salt);
        let cipher = FieldCipher::new_from_slice(&key[..]).map_err(|_| EncryptionError::Cipher)?;

        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = cipher
            .encrypt_in_place_detached(Nonce::<U16>::from_slice(&iv), b"", &mut buffer)
            .map_err(|_| EncryptionError::Cipher)?;

        let mut out = Vec::with_capacity(HEADER_LEN + buffer.len());
        out.extend_from_slice(&salt);
        out.extend_from_slice(&iv);
        out.extend_from_slice(&tag);
        out.extend_from_slice(&buffer);
        Ok(EncryptedBlob(STANDARD.encode(out)))
    }

    /// Decrypt a blob. Any malformed, tampered or foreign blob gives `None`.
    pub fn decrypt(&self, blob: &str) -> Option<String> {
        let plaintext = self.open(blob);
        if plaintext.is_none() {
            debug!("field decryption failed");
        }
        plaintext
    }

    fn open(&self, blob: &str) -> Option<String> {
        let raw = STANDARD.decode(blob.trim()).ok()?;
        if raw.len() < HEADER_LEN {
            return None;
        }
        let (salt, rest) = raw.split_at(SALT_LEN);
        let (iv, rest) = rest.split_at(IV_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);

        let key = self.derive_key(salt);
        let cipher = FieldCipher::new_from_slice(&key[..]).ok()?;

        let mut buffer = Zeroizing::new(ciphertext.to_vec());
        cipher
            .decrypt_in_place_detached(Nonce::<U16>::from_slice(iv), b"", &mut buffer[..], Tag::<U16>::from_slice(tag))
            .ok()?;
        String::from_utf8(buffer.to_vec()).ok()
    }

    /// Encrypt the named string fields of a JSON object. Other fields are untouched.
    pub fn encrypt_fields(&self, object: &Map<String, Value>, fields: &[&str]) -> Result<Map<String, Value>, EncryptionError> {
        let mut result = object.clone();
        for field in fields {
            if let Some(Value::String(plaintext)) = object.get(*field) {
                let blob = self.encrypt_str(plaintext)?;
                result.insert((*field).to_string(), Value::String(blob.into_string()));
            }
        }
        Ok(result)
    }

    /// Decrypt the named string fields of a JSON object. Undecryptable fields become `null`.
    pub fn decrypt_fields(&self, object: &Map<String, Value>, fields: &[&str]) -> Map<String, Value> {
        let mut result = object.clone();
        for field in fields {
            if let Some(Value::String(blob)) = object.get(*field) {
                let plaintext = self.decrypt(blob).map(Value::String).unwrap_or(Value::Null);
                result.insert((*field).to_string(), plaintext);
            }
        }
        result
    }

    /// Encrypt a structured value as JSON
    pub fn encrypt_value<T: Serialize>(&self, value: &T) -> Result<EncryptedBlob, EncryptionError> {
        let json = Zeroizing::new(
            serde_json::to_string(value).map_err(|e| EncryptionError::Serialization(e.to_string()))?,
        );
        self.encrypt_str(&json)
    }

    /// Decrypt a structured value. Undecryptable or non-matching JSON gives `None`.
    pub fn decrypt_value<T: DeserializeOwned>(&self, blob: &str) -> Option<T> {
        let json = Zeroizing::new(self.decrypt(blob)?);
        serde_json::from_str(&json).ok()
    }

    /// [`encrypt_str`](Self::encrypt_str) on the blocking pool, bounded by the KDF timeout
    pub async fn encrypt_async(&self, plaintext: String) -> Result<EncryptedBlob, EncryptionError> {
        let encryptor = self.clone();
        let plaintext = Zeroizing::new(plaintext);
        self.run_blocking(move || encryptor.encrypt_str(&plaintext)).await?
    }

    /// [`decrypt`](Self::decrypt) on the blocking pool, bounded by the KDF timeout
    pub async fn decrypt_async(&self, blob: String) -> Result<Option<String>, EncryptionError> {
        let encryptor = self.clone();
        self.run_blocking(move || encryptor.decrypt(&blob)).await
    }

    async fn run_blocking<T, F>(&self, f: F) -> Result<T, EncryptionError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        match tokio::time::timeout(self.kdf_timeout, tokio::task::spawn_blocking(f)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(EncryptionError::Task(e.to_string())),
            Err(_) => Err(EncryptionError::Timeout(self.kdf_timeout.as_millis() as u64)),
        }
    }

    fn derive_key(&self, salt: &[u8]) -> Zeroizing<[u8; KEY_LEN]> {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        pbkdf2::pbkdf2_hmac::<Sha512>(self.secret.password(), salt, self.iterations, &mut key[..]);
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    const TEST_ITERATIONS: u32 = 1_000;

    fn encryptor(secret: &str) -> FieldEncryptor {
        FieldEncryptor::new(MasterSecret::new(secret).unwrap(), TEST_ITERATIONS).unwrap()
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Address {
        street: String,
        city: String,
        postcode: String,
    }

    #[test]
    fn test_round_trip() {
        let enc = encryptor("master");
        for plaintext in ["jane@example.com", "", "Zoë Müller, 東京 🚗"] {
            let blob = enc.encrypt_str(plaintext).unwrap();
            assert_eq!(enc.decrypt(blob.as_str()).as_deref(), Some(plaintext));
        }
    }

    #[test]
    fn test_none_stays_none() {
        let enc = encryptor("master");
        assert_eq!(enc.encrypt(None).unwrap(), None);
        assert!(enc.encrypt(Some("x")).unwrap().is_some());
    }

    #[test]
    fn test_same_plaintext_gives_distinct_blobs() {
        let enc = encryptor("master");
        let a = enc.encrypt_str("same").unwrap();
        let b = enc.encrypt_str("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_blob_layout() {
        let enc = encryptor("master");
        let blob = enc.encrypt_str("hello").unwrap();
        let raw = STANDARD.decode(blob.as_str()).unwrap();
        assert_eq!(raw.len(), HEADER_LEN + 5);
    }

    #[test]
    fn test_any_single_byte_tamper_is_rejected() {
        let enc = encryptor("master");
        let blob = enc.encrypt_str("iban FR76").unwrap();
        let raw = STANDARD.decode(blob.as_str()).unwrap();

        for i in 0..raw.len() {
            let mut tampered = raw.clone();
            tampered[i] ^= 0x01;
            assert_eq!(enc.decrypt(&STANDARD.encode(&tampered)), None, "byte {} accepted", i);
        }
    }

    #[test]
    fn test_wrong_secret_and_garbage_rejected() {
        let blob = encryptor("master").encrypt_str("secret").unwrap();
        assert_eq!(encryptor("other").decrypt(blob.as_str()), None);

        let enc = encryptor("master");
        assert_eq!(enc.decrypt("not base64!"), None);
        assert_eq!(enc.decrypt(&STANDARD.encode([0u8; 10])), None);
        assert_eq!(enc.decrypt(""), None);
    }

    #[test]
    fn test_iteration_count_is_part_of_the_key() {
        let blob = encryptor("master").encrypt_str("x").unwrap();
        let other = FieldEncryptor::new(MasterSecret::new("master").unwrap(), TEST_ITERATIONS + 1).unwrap();
        assert_eq!(other.decrypt(blob.as_str()), None);
    }

    #[test]
    fn test_zero_iterations_rejected() {
        assert_eq!(
            FieldEncryptor::new(MasterSecret::new("m").unwrap(), 0).unwrap_err(),
            EncryptionError::InvalidIterations(0)
        );
    }

    #[test]
    fn test_encrypt_and_decrypt_fields() {
        let enc = encryptor("master");
        let contact = json!({
            "name": "Jane",
            "email": "jane@example.com",
            "phone": "+33612345678",
            "age": 41,
        });
        let object = contact.as_object().unwrap();

        let sealed = enc.encrypt_fields(object, &["email", "phone", "age", "missing"]).unwrap();
        assert_eq!(sealed["name"], "Jane");
        assert_eq!(sealed["age"], 41);
        assert!(!sealed.contains_key("missing"));
        assert_ne!(sealed["email"], "jane@example.com");

        let opened = enc.decrypt_fields(&sealed, &["email", "phone", "age"]);
        assert_eq!(&opened, object);
    }

    #[test]
    fn test_undecryptable_field_becomes_null() {
        let enc = encryptor("master");
        let object = json!({ "email": "garbage" });
        let opened = enc.decrypt_fields(object.as_object().unwrap(), &["email"]);
        assert_eq!(opened["email"], Value::Null);
    }

    #[test]
    fn test_structured_value() {
        let enc = encryptor("master");
        let address = Address {
            street: "12 rue de la Paix".into(),
            city: "Paris".into(),
            postcode: "75002".into(),
        };
        let blob = enc.encrypt_value(&address).unwrap();
        assert_eq!(enc.decrypt_value::<Address>(blob.as_str()), Some(address));

        let text = enc.encrypt_str("plain text").unwrap();
        assert_eq!(enc.decrypt_value::<Address>(text.as_str()), None);
    }

    #[tokio::test]
    async fn test_async_round_trip() {
        let enc = encryptor("master");
        let blob = enc.encrypt_async("async value".to_string()).await.unwrap();
        assert_eq!(enc.decrypt_async(blob.into_string()).await.unwrap().as_deref(), Some("async value"));
    }

    #[tokio::test]
    async fn test_async_timeout() {
        let enc = FieldEncryptor::new(MasterSecret::new("master").unwrap(), 200_000)
            .unwrap()
            .with_kdf_timeout(Duration::from_millis(1));
        assert_eq!(
            enc.encrypt_async("slow".to_string()).await.unwrap_err(),
            EncryptionError::Timeout(1)
        );
    }

    #[test]
    fn test_blob_serializes_as_plain_string() {
        let blob = EncryptedBlob::from_stored("QUJD");
        assert_eq!(serde_json::to_value(&blob).unwrap(), json!("QUJD"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn round_trip_any_text(plaintext in "\\PC{0,64}") {
            let enc = FieldEncryptor::new(MasterSecret::new("prop").unwrap(), 1).unwrap();
            let blob = enc.encrypt_str(&plaintext).unwrap();
            prop_assert_eq!(enc.decrypt(blob.as_str()), Some(plaintext));
        }
    }
}
