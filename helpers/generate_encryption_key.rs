//! Encryption Key Generation Tool
//!
//! Generates a random 32-byte AES-256-GCM key for
//! `CHANNEL_ACCOUNT_ENCRYPTION_KEY` and prints it base64 encoded.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example generate_encryption_key
//! ```
use aes_gcm::{aead::OsRng, Aes256Gcm, KeyInit};
use base64::{engine::general_purpose::STANDARD, Engine};

fn main() {
    let key = Aes256Gcm::generate_key(OsRng);
    println!("Generated new encryption key: {}", STANDARD.encode(key));
}
