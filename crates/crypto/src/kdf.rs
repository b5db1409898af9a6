//! Passphrase-to-key derivation.

use sha2::{Digest, Sha256};

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;

/// CBC initialization vector size in bytes.
pub const IV_SIZE: usize = 16;

/// Derives an AES-256 key and IV from a passphrase and salt.
///
/// This is the OpenSSL bytes-to-key construction with SHA-256: each round
/// hashes the previous digest, the passphrase, and the salt, and the
/// concatenated digests are split into 32 key bytes and 16 IV bytes. One
/// round matches the stream format this crate reads and writes.
#[must_use]
pub fn derive_key_iv(passphrase: &[u8], salt: &[u8], rounds: u32) -> ([u8; KEY_SIZE], [u8; IV_SIZE]) {
    let mut derived = Vec::with_capacity(KEY_SIZE + IV_SIZE + 32);
    let mut previous: Vec<u8> = Vec::new();

    while derived.len() < KEY_SIZE + IV_SIZE {
        let mut hasher = Sha256::new();
        hasher.update(&previous);
        hasher.update(passphrase);
        hasher.update(salt);
        let mut digest = hasher.finalize().to_vec();

        for _ in 1..rounds.max(1) {
            digest = Sha256::digest(&digest).to_vec();
        }

        derived.extend_from_slice(&digest);
        previous = digest;
    }

    let mut key = [0u8; KEY_SIZE];
    let mut iv = [0u8; IV_SIZE];
    key.copy_from_slice(&derived[..KEY_SIZE]);
    iv.copy_from_slice(&derived[KEY_SIZE..KEY_SIZE + IV_SIZE]);

    (key, iv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let (key1, iv1) = derive_key_iv(b"passphrase", &[1, 2, 3, 4, 5, 6, 7, 8], 1);
        let (key2, iv2) = derive_key_iv(b"passphrase", &[1, 2, 3, 4, 5, 6, 7, 8], 1);

        assert_eq!(key1, key2);
        assert_eq!(iv1, iv2);
    }

    #[test]
    fn salt_and_passphrase_both_matter() {
        let (base, _) = derive_key_iv(b"passphrase", &[1; 8], 1);
        let (other_salt, _) = derive_key_iv(b"passphrase", &[2; 8], 1);
        let (other_pass, _) = derive_key_iv(b"different", &[1; 8], 1);

        assert_ne!(base, other_salt);
        assert_ne!(base, other_pass);
    }

    #[test]
    fn first_block_matches_single_hash() {
        // With one round, the first 32 derived bytes are sha256(pass || salt)
        let (key, _) = derive_key_iv(b"pass", b"saltsalt", 1);

        let mut hasher = Sha256::new();
        hasher.update(b"pass");
        hasher.update(b"saltsalt");
        assert_eq!(key.as_slice(), hasher.finalize().as_slice());
    }
}
