use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("invalid encryption key: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("key file {path} is not valid base64: {source}")]
    KeyEncoding {
        path: PathBuf,
        source: base64::DecodeError,
    },

    #[error("failed to read key file {path}: {source}")]
    KeyRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write key file {path}: {source}")]
    KeyWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(&'static str),

    #[error("encryption failed")]
    Encrypt,

    #[error("decryption failed: wrong key or tampered value")]
    Decrypt,

    #[error("{0} is not set")]
    Missing(String),
}
