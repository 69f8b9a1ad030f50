use crate::cipher::{Cipher, is_encrypted};
use crate::error::SecretError;
use courier_std::env::ReadEnv;

/// Environment variables that hold credentials and should be stored sealed.
pub const SENSITIVE_KEYS: &[&str] = &["API_TOKEN", "GITHUB_TOKEN", "SMARTSHEET_TOKEN"];

/// How a configured value is stored, for inspection tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretView {
    Unset,
    Plaintext(String),
    Encrypted(String),
}

/// Reads configuration values from the environment, opening `ENC[...]` ones.
pub struct SecretStore<E> {
    env: E,
    cipher: Cipher,
}

impl<E: ReadEnv> SecretStore<E> {
    pub fn new(env: E, cipher: Cipher) -> Self {
        Self { env, cipher }
    }

    pub fn cipher(&self) -> &Cipher {
        &self.cipher
    }

    /// The plaintext of `key`, or `None` when the variable is unset or empty.
    pub fn get_decrypted_value(&self, key: &str) -> Result<Option<String>, SecretError> {
        match self.env.var(key) {
            Ok(value) if !value.trim().is_empty() => self.cipher.decrypt(value.trim()).map(Some),
            _ => Ok(None),
        }
    }

    pub fn require(&self, key: &str) -> Result<String, SecretError> {
        self.get_decrypted_value(key)?
            .ok_or_else(|| SecretError::Missing(key.to_string()))
    }

    pub fn inspect(&self, key: &str) -> Result<SecretView, SecretError> {
        let raw = match self.env.var(key) {
            Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
            _ => return Ok(SecretView::Unset),
        };
        if is_encrypted(&raw) {
            self.cipher.decrypt(&raw).map(SecretView::Encrypted)
        } else {
            Ok(SecretView::Plaintext(raw))
        }
    }
}

/// Keep the first and last four characters of long values, star the rest.
pub fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(chars.len() - 8))
}
