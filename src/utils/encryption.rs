//! AES-256-GCM sealing of channel account seeds.
//!
//! Each seed is encrypted with the account's public key as associated data,
//! so a ciphertext copied onto another channel account row fails to open.

use aes_gcm::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng, Payload},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroize;

const ENCRYPTION_VERSION: u8 = 1;
const NONCE_LENGTH: usize = 12;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncryptionError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("Invalid encrypted data format: {0}")]
    InvalidFormat(String),
    #[error("Invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("Unsupported encryption version: {0}")]
    UnsupportedVersion(u8),
}

/// Nonce and ciphertext, both base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    pub nonce: String,
    pub ciphertext: String,
    pub version: u8,
}

#[derive(Clone)]
pub struct FieldEncryption {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for FieldEncryption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldEncryption").finish_non_exhaustive()
    }
}

impl FieldEncryption {
    pub fn new_with_key(key: &[u8; 32]) -> Self {
        let key = Key::<Aes256Gcm>::from(*key);
        Self {
            cipher: Aes256Gcm::new(&key),
        }
    }

    /// Builds the cipher from a base64 encoded 32-byte key.
    pub fn from_base64_key(encoded: &str) -> Result<Self, EncryptionError> {
        let mut key_bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| EncryptionError::InvalidFormat(format!("Invalid key: {e}")))?;
        if key_bytes.len() != 32 {
            let len = key_bytes.len();
            key_bytes.zeroize();
            return Err(EncryptionError::InvalidKeyLength(len));
        }

        let mut key_array = [0u8; 32];
        key_array.copy_from_slice(&key_bytes);
        key_bytes.zeroize();

        let encryption = Self::new_with_key(&key_array);
        key_array.zeroize();
        Ok(encryption)
    }

    pub fn encrypt_with_aad(
        &self,
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<EncryptedData, EncryptionError> {
        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from(nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|e| EncryptionError::EncryptionFailed(e.to_string()))?;

        Ok(EncryptedData {
            nonce: STANDARD.encode(nonce_bytes),
            ciphertext: STANDARD.encode(ciphertext),
            version: ENCRYPTION_VERSION,
        })
    }

    pub fn decrypt_with_aad(
        &self,
        encrypted_data: &EncryptedData,
        aad: &[u8],
    ) -> Result<Vec<u8>, EncryptionError> {
        if encrypted_data.version != ENCRYPTION_VERSION {
            return Err(EncryptionError::UnsupportedVersion(encrypted_data.version));
        }

        let nonce_bytes = STANDARD
            .decode(&encrypted_data.nonce)
            .map_err(|e| EncryptionError::InvalidFormat(format!("Invalid nonce: {e}")))?;
        let ciphertext = STANDARD
            .decode(&encrypted_data.ciphertext)
            .map_err(|e| EncryptionError::InvalidFormat(format!("Invalid ciphertext: {e}")))?;

        let nonce_array: [u8; NONCE_LENGTH] = nonce_bytes.as_slice().try_into().map_err(|_| {
            EncryptionError::InvalidFormat(format!(
                "Invalid nonce length: expected {NONCE_LENGTH}, got {}",
                nonce_bytes.len()
            ))
        })?;
        let nonce = Nonce::from(nonce_array);

        self.cipher
            .decrypt(
                &nonce,
                Payload {
                    msg: ciphertext.as_ref(),
                    aad,
                },
            )
            .map_err(|e| EncryptionError::DecryptionFailed(e.to_string()))
    }

    /// Seals a channel account seed, binding it to the account's public key.
    pub fn encrypt_seed(
        &self,
        public_key: &str,
        seed: &str,
    ) -> Result<EncryptedData, EncryptionError> {
        self.encrypt_with_aad(seed.as_bytes(), public_key.as_bytes())
    }

    pub fn decrypt_seed(
        &self,
        public_key: &str,
        encrypted_data: &EncryptedData,
    ) -> Result<String, EncryptionError> {
        let plaintext = self.decrypt_with_aad(encrypted_data, public_key.as_bytes())?;
        String::from_utf8(plaintext)
            .map_err(|e| EncryptionError::InvalidFormat(format!("Seed is not UTF-8: {e}")))
    }
}
