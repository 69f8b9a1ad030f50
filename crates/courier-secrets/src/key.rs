//! Key file handling. The key is stored base64-encoded in a file readable only
//! by its owner.

use crate::error::SecretError;
use aes_gcm::aead::{KeyInit, OsRng};
use aes_gcm::Aes256Gcm;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use courier_std::fs::{ReadFile, WriteFile};
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info};

pub const KEY_SIZE: usize = 32;
pub const DEFAULT_KEY_FILE: &str = ".encryption_key";

pub fn generate_key() -> [u8; KEY_SIZE] {
    let generated = Aes256Gcm::generate_key(&mut OsRng);
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&generated);
    key
}

/// Read an existing key file.
pub fn load_key<F: ReadFile>(fs: &F, path: &Path) -> Result<[u8; KEY_SIZE], SecretError> {
    let raw = fs.read_to_string(path).map_err(|source| SecretError::KeyRead {
        path: path.to_path_buf(),
        source,
    })?;
    decode_key(path, raw.trim())
}

/// Write a fresh key to `path`. Refuses to replace an existing key, since
/// values sealed with it would become unreadable.
pub fn create_key_file<F: WriteFile>(fs: &F, path: &Path) -> Result<[u8; KEY_SIZE], SecretError> {
    let key = generate_key();
    fs.create_private(path, &STANDARD.encode(key))
        .map_err(|source| SecretError::KeyWrite {
            path: path.to_path_buf(),
            source,
        })?;
    info!(path = %path.display(), "generated new encryption key");
    Ok(key)
}

pub fn load_or_generate<F: ReadFile + WriteFile>(
    fs: &F,
    path: &Path,
) -> Result<[u8; KEY_SIZE], SecretError> {
    match fs.read_to_string(path) {
        Ok(raw) => {
            debug!(path = %path.display(), "loaded encryption key");
            decode_key(path, raw.trim())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => create_key_file(fs, path),
        Err(source) => Err(SecretError::KeyRead {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn decode_key(path: &Path, encoded: &str) -> Result<[u8; KEY_SIZE], SecretError> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|source| SecretError::KeyEncoding {
            path: path.to_path_buf(),
            source,
        })?;
    let actual = bytes.len();
    bytes
        .try_into()
        .map_err(|_| SecretError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual,
        })
}
