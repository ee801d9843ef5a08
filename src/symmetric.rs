use aes::Aes128;
use block_modes::block_padding::Pkcs7;
use block_modes::{BlockMode, Cbc};
use generic_array::{typenum::U16, GenericArray};
use rand::rngs::OsRng;
use rand_core::RngCore;

use crate::error::TrusteeError;

type Aes128Cbc = Cbc<Aes128, Pkcs7>;

/// The trustee's master key for wrapping private shares at rest.
pub type Key = GenericArray<u8, U16>;

pub fn gen_key() -> Key {
    let mut key_bytes = [0u8; 16];
    OsRng.fill_bytes(&mut key_bytes);

    GenericArray::clone_from_slice(&key_bytes)
}

pub fn key_from_bytes(bytes: &[u8]) -> Result<Key, TrusteeError> {
    if bytes.len() != 16 {
        return Err(TrusteeError::Configuration(format!(
            "aes key must be 16 bytes, got {}",
            bytes.len()
        )));
    }

    Ok(GenericArray::clone_from_slice(bytes))
}

/// Encrypts under a fresh random IV; the IV is public and stored next
/// to the ciphertext.
pub fn encrypt(key: &Key, bytes: &[u8]) -> Result<(Vec<u8>, Vec<u8>), TrusteeError> {
    let mut iv = [0u8; 16];
    OsRng.fill_bytes(&mut iv);
    let cipher = Aes128Cbc::new_from_slices(key, &iv)
        .map_err(|e| TrusteeError::Symmetric(e.to_string()))?;

    Ok((cipher.encrypt_vec(bytes), iv.to_vec()))
}

/// Decryption with the wrong key fails the PKCS#7 padding check with
/// overwhelming probability; that failure is a hard error.
pub fn decrypt(key: &Key, iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, TrusteeError> {
    let cipher = Aes128Cbc::new_from_slices(key, iv)
        .map_err(|e| TrusteeError::Symmetric(e.to_string()))?;

    cipher
        .decrypt_vec(ciphertext)
        .map_err(|_| TrusteeError::Symmetric("padding check failed".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aes_roundtrip() {
        let key = gen_key();
        let plaintext = b"0123456789abcdef and change";
        let (ciphertext, iv) = encrypt(&key, plaintext).unwrap();
        assert_ne!(ciphertext.as_slice(), plaintext.as_slice());

        let decrypted = decrypt(&key, &iv, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext.to_vec());
    }

    #[test]
    fn test_aes_fresh_iv() {
        let key = gen_key();
        let (c1, iv1) = encrypt(&key, b"same message").unwrap();
        let (c2, iv2) = encrypt(&key, b"same message").unwrap();

        assert_ne!(iv1, iv2);
        assert_ne!(c1, c2);
    }

    #[test]
    fn test_aes_wrong_key() {
        let key = gen_key();
        let other = gen_key();
        let plaintext = b"0123456789abcdef";
        let (ciphertext, iv) = encrypt(&key, plaintext).unwrap();

        let result = decrypt(&other, &iv, &ciphertext);
        assert!(result.map(|p| p != plaintext.to_vec()).unwrap_or(true));
    }
}
