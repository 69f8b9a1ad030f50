use crate::error::SecretError;
use crate::key::KEY_SIZE;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt;

const PREFIX: &str = "ENC[";
const SUFFIX: &str = "]";
const NONCE_SIZE: usize = 12;

/// Whether `value` carries the `ENC[...]` envelope.
pub fn is_encrypted(value: &str) -> bool {
    value.len() >= PREFIX.len() + SUFFIX.len() && value.starts_with(PREFIX) && value.ends_with(SUFFIX)
}

#[derive(Clone)]
pub struct Cipher {
    aead: Aes256Gcm,
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cipher(<redacted>)")
    }
}

impl Cipher {
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self {
            aead: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
        }
    }

    pub fn from_slice(key: &[u8]) -> Result<Self, SecretError> {
        let aead = Aes256Gcm::new_from_slice(key).map_err(|_| SecretError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: key.len(),
        })?;
        Ok(Self { aead })
    }

    /// Seal `plaintext` under a fresh random nonce. Empty input stays empty.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, SecretError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .aead
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| SecretError::Encrypt)?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(format!("{PREFIX}{}{SUFFIX}", STANDARD.encode(sealed)))
    }

    /// Open an `ENC[...]` value. Anything without the envelope is returned
    /// unchanged, so plaintext configuration keeps working.
    pub fn decrypt(&self, value: &str) -> Result<String, SecretError> {
        if !is_encrypted(value) {
            return Ok(value.to_string());
        }

        let encoded = &value[PREFIX.len()..value.len() - SUFFIX.len()];
        let sealed = STANDARD
            .decode(encoded)
            .map_err(|_| SecretError::InvalidCiphertext("payload is not base64"))?;
        if sealed.len() < NONCE_SIZE {
            return Err(SecretError::InvalidCiphertext("payload shorter than nonce"));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        let plaintext = self
            .aead
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| SecretError::Decrypt)?;
        String::from_utf8(plaintext)
            .map_err(|_| SecretError::InvalidCiphertext("plaintext is not UTF-8"))
    }
}
