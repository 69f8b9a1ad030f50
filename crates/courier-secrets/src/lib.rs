//! Encrypted configuration values.
//!
//! Sensitive settings (API tokens) may be stored as `ENC[<base64>]`, where the
//! payload is a 12-byte nonce followed by AES-256-GCM ciphertext. The 32-byte
//! key lives in a private key file, created on first use.
//!
//! ```
//! use courier_secrets::{Cipher, is_encrypted};
//!
//! let cipher = Cipher::new([7u8; 32]);
//! let sealed = cipher.encrypt("ghp_example").unwrap();
//!
//! assert!(is_encrypted(&sealed));
//! assert_eq!(cipher.decrypt(&sealed).unwrap(), "ghp_example");
//! ```

pub mod cipher;
pub mod error;
pub mod key;
pub mod store;

pub use cipher::{Cipher, is_encrypted};
pub use error::SecretError;
pub use key::{DEFAULT_KEY_FILE, KEY_SIZE, create_key_file, load_key, load_or_generate};
pub use store::{SENSITIVE_KEYS, SecretStore, SecretView, mask};
