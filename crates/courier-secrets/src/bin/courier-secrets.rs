//! Key and secret management for courier deployments.
//!
//! ```text
//! courier-secrets generate-key
//! courier-secrets encrypt <value>
//! courier-secrets decrypt 'ENC[...]'
//! courier-secrets show [--decrypt] [KEY...]
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use courier_secrets::{
    Cipher, DEFAULT_KEY_FILE, SENSITIVE_KEYS, SecretStore, SecretView, create_key_file, load_key,
    load_or_generate, mask,
};
use courier_std::{SystemEnv, SystemFs};

#[derive(Parser)]
#[command(name = "courier-secrets", about = "Manage courier's encryption key and sealed values")]
struct Cli {
    /// Path to the encryption key file.
    #[arg(long, env = "COURIER_KEY_FILE", default_value = DEFAULT_KEY_FILE, global = true)]
    key_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new key file. Fails if one already exists.
    GenerateKey,
    /// Seal a value as ENC[...], creating the key file if needed.
    Encrypt { value: String },
    /// Open an ENC[...] value.
    Decrypt { value: String },
    /// Show how sensitive variables are stored, masked unless --decrypt.
    Show {
        #[arg(long)]
        decrypt: bool,
        keys: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateKey => {
            create_key_file(&SystemFs, &cli.key_file)
                .with_context(|| format!("remove {} first to replace it", cli.key_file.display()))?;
            println!("Key file created: {}", cli.key_file.display());
            println!("File permissions: 0600 (read/write for owner only)");
        }
        Command::Encrypt { value } => {
            let cipher = Cipher::new(load_or_generate(&SystemFs, &cli.key_file)?);
            println!("{}", cipher.encrypt(&value)?);
        }
        Command::Decrypt { value } => {
            let cipher = Cipher::new(load_key(&SystemFs, &cli.key_file)?);
            println!("{}", cipher.decrypt(&value)?);
        }
        Command::Show { decrypt, keys } => {
            let cipher = Cipher::new(load_key(&SystemFs, &cli.key_file)?);
            let store = SecretStore::new(SystemEnv, cipher);
            let keys: Vec<String> = if keys.is_empty() {
                SENSITIVE_KEYS.iter().map(|k| k.to_string()).collect()
            } else {
                keys
            };

            for key in &keys {
                println!("{}", render(&store, key, decrypt));
            }
            if decrypt {
                println!("\nCAUTION: decrypted values shown. Handle this output securely.");
            }
        }
    }

    Ok(())
}

fn render(store: &SecretStore<SystemEnv>, key: &str, decrypt: bool) -> String {
    let reveal = |value: &str| if decrypt { value.to_string() } else { mask(value) };
    match store.inspect(key) {
        Ok(SecretView::Unset) => format!("{key}: <not set>"),
        Ok(SecretView::Plaintext(value)) => format!("{key}: {} (plaintext)", reveal(&value)),
        Ok(SecretView::Encrypted(value)) => format!("{key}: {} (encrypted)", reveal(&value)),
        Err(e) => format!("{key}: <error decrypting: {e}>"),
    }
}
