//! Encryption of secrets stored in the metadata database (data source passwords).
//!
//! Values are sealed with AES-256-GCM. The key is the SHA-256 digest of the configured
//! `secret_key`, so rotating `secret_key` makes stored source passwords unreadable.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine as _, engine::general_purpose};
use rand::prelude::RngExt;
use rand::rng;
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;

fn cipher(secret_key: &str) -> Result<Aes256Gcm, anyhow::Error> {
    let key = Sha256::digest(secret_key.as_bytes());
    Aes256Gcm::new_from_slice(&key).map_err(|e| anyhow::anyhow!("Failed to create cipher: {}", e))
}

/// Encrypt `plaintext`, returning base64 of `nonce || ciphertext`.
pub fn encrypt_secret(secret_key: &str, plaintext: &str) -> Result<String, anyhow::Error> {
    let cipher = cipher(secret_key)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rng().fill(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| anyhow::anyhow!("Encryption failed: {}", e))?;

    let mut sealed = nonce_bytes.to_vec();
    sealed.extend_from_slice(&ciphertext);
    Ok(general_purpose::STANDARD.encode(sealed))
}

/// Reverse of [`encrypt_secret`].
pub fn decrypt_secret(secret_key: &str, encrypted_b64: &str) -> Result<String, anyhow::Error> {
    let cipher = cipher(secret_key)?;

    let sealed = general_purpose::STANDARD
        .decode(encrypted_b64)
        .map_err(|e| anyhow::anyhow!("Failed to decode encrypted data: {}", e))?;
    if sealed.len() < NONCE_LEN {
        return Err(anyhow::anyhow!("Encrypted data too short"));
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|e| anyhow::anyhow!("Decryption failed: {}", e))?;

    String::from_utf8(plaintext).map_err(|e| anyhow::anyhow!("Decrypted secret is not UTF-8: {}", e))
}
