use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit},
};
use base64::{Engine as _, engine::general_purpose};
use pbkdf2::pbkdf2_hmac;
use rand::{RngCore, rngs::OsRng};
use sha2::Sha256;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

const PBKDF2_ITERATIONS: u32 = 100_000;
const SALT_LENGTH: usize = 32;
const KEY_LENGTH: usize = 32;
const NONCE_LENGTH: usize = 12;

/// Length of the random secret written to the per-user key file.
pub const KEY_MATERIAL_LENGTH: usize = 32;

const ERROR_EMPTY_SECRET: &str = "Key material cannot be empty";
const ERROR_EMPTY_ENCRYPTED_DATA: &str = "Encrypted data cannot be empty";
const ERROR_ENCRYPTED_DATA_TOO_SHORT: &str = "Encrypted data too short";

#[derive(Debug)]
pub enum EncryptionError {
    InvalidData(String),
    EncryptionFailed(String),
    DecryptionFailed(String),
    KeyDerivation(String),
}

impl fmt::Display for EncryptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncryptionError::InvalidData(msg) => write!(f, "Invalid data: {msg}"),
            EncryptionError::EncryptionFailed(msg) => write!(f, "Encryption failed: {msg}"),
            EncryptionError::DecryptionFailed(msg) => write!(f, "Decryption failed: {msg}"),
            EncryptionError::KeyDerivation(msg) => write!(f, "Key derivation failed: {msg}"),
        }
    }
}

impl std::error::Error for EncryptionError {}

#[derive(ZeroizeOnDrop)]
struct SecureKey([u8; KEY_LENGTH]);

impl SecureKey {
    fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }
}

/// AES-256-GCM sealing of cache payloads with PBKDF2 key derivation.
///
/// Each call to [`seal`](Self::seal) draws a fresh salt and nonce, so the
/// output is self-describing: `base64(salt || nonce || ciphertext)`. Only the
/// secret has to be supplied again to [`open`](Self::open) the payload.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ProtectedCipher {
    secret: Vec<u8>,
}

impl ProtectedCipher {
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self, EncryptionError> {
        let secret = secret.into();
        if secret.iter().all(u8::is_ascii_whitespace) {
            return Err(EncryptionError::InvalidData(ERROR_EMPTY_SECRET.to_string()));
        }
        Ok(Self { secret })
    }

    /// Generates random key material suitable for a per-user key file.
    pub fn generate_key_material() -> [u8; KEY_MATERIAL_LENGTH] {
        let mut material = [0u8; KEY_MATERIAL_LENGTH];
        OsRng.fill_bytes(&mut material);
        material
    }

    fn derive_key(&self, salt: &[u8]) -> SecureKey {
        let mut key = [0u8; KEY_LENGTH];
        pbkdf2_hmac::<Sha256>(&self.secret, salt, PBKDF2_ITERATIONS, &mut key);
        SecureKey(key)
    }

    pub fn seal(&self, plaintext: &str) -> Result<String, EncryptionError> {
        let mut salt = [0u8; SALT_LENGTH];
        OsRng.fill_bytes(&mut salt);

        let key = self.derive_key(&salt);
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| EncryptionError::KeyDerivation(format!("Invalid key: {e}")))?;

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = cipher.encrypt(&nonce, plaintext.as_bytes()).map_err(|e| {
            EncryptionError::EncryptionFailed(format!("AES-GCM encryption failed: {e}"))
        })?;

        let mut combined = Vec::with_capacity(SALT_LENGTH + NONCE_LENGTH + ciphertext.len());
        combined.extend_from_slice(&salt);
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);

        Ok(general_purpose::STANDARD.encode(combined))
    }

    pub fn open(&self, sealed: &str) -> Result<String, EncryptionError> {
        let sealed = sealed.trim();
        if sealed.is_empty() {
            return Err(EncryptionError::InvalidData(
                ERROR_EMPTY_ENCRYPTED_DATA.to_string(),
            ));
        }

        let combined = general_purpose::STANDARD
            .decode(sealed)
            .map_err(|e| EncryptionError::InvalidData(format!("Invalid base64: {e}")))?;

        if combined.len() < SALT_LENGTH + NONCE_LENGTH {
            return Err(EncryptionError::InvalidData(
                ERROR_ENCRYPTED_DATA_TOO_SHORT.to_string(),
            ));
        }

        let (salt, rest) = combined.split_at(SALT_LENGTH);
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LENGTH);
        let nonce = Nonce::from_slice(nonce_bytes);

        let key = self.derive_key(salt);
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| EncryptionError::KeyDerivation(format!("Invalid key: {e}")))?;

        let plaintext = cipher.decrypt(nonce, ciphertext).map_err(|e| {
            EncryptionError::DecryptionFailed(format!("AES-GCM decryption failed: {e}"))
        })?;

        String::from_utf8(plaintext)
            .map_err(|e| EncryptionError::DecryptionFailed(format!("Invalid UTF-8: {e}")))
    }
}
