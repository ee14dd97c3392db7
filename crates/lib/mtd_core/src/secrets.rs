//! AES-256-GCM encryption for OAuth tokens at rest.
//!
//! Output is base64 `nonce || ciphertext || tag` for storage in TEXT columns.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::MtdError;

const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

fn cipher(encryption_key: &str) -> Result<Aes256Gcm, MtdError> {
    let key = Sha256::digest(encryption_key.as_bytes());
    Aes256Gcm::new_from_slice(&key).map_err(|e| MtdError::Encryption(format!("Key init failed: {e}")))
}

pub fn encrypt(plaintext: &str, encryption_key: &str) -> Result<String, MtdError> {
    let cipher = cipher(encryption_key)?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce_bytes);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
        .map_err(|e| MtdError::Encryption(format!("Encryption failed: {e}")))?;

    let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);
    Ok(base64::engine::general_purpose::STANDARD.encode(&combined))
}

pub fn decrypt(encrypted_b64: &str, encryption_key: &str) -> Result<String, MtdError> {
    let combined = base64::engine::general_purpose::STANDARD
        .decode(encrypted_b64)
        .map_err(|e| MtdError::Encryption(format!("Base64 decode failed: {e}")))?;

    if combined.len() < NONCE_SIZE + TAG_SIZE {
        return Err(MtdError::Encryption("Ciphertext too short".into()));
    }

    let (nonce, ciphertext) = combined.split_at(NONCE_SIZE);
    let plaintext = cipher(encryption_key)?
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| MtdError::Encryption(format!("Decryption failed: {e}")))?;

    String::from_utf8(plaintext).map_err(|e| MtdError::Encryption(format!("UTF-8 decode failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_survive_encryption() {
        let key = "mtd-test-key";
        let token = "a3f1c9e0b7d24c1e9f0a";
        let sealed = encrypt(token, key).unwrap();
        assert_ne!(sealed, token);
        assert_eq!(decrypt(&sealed, key).unwrap(), token);
    }

    #[test]
    fn same_plaintext_gets_fresh_nonce() {
        let key = "mtd-test-key";
        assert_ne!(encrypt("x", key).unwrap(), encrypt("x", key).unwrap());
    }

    #[test]
    fn wrong_key_or_truncated_input_fails() {
        let sealed = encrypt("secret", "right").unwrap();
        assert!(decrypt(&sealed, "wrong").is_err());
        assert!(decrypt("AAAA", "right").is_err());
    }
}
