#![deny(unsafe_code)]

//! # Overview
//!
//! Streaming digest wrappers over the well-known hash algorithms the storage
//! layer relies on: MD5 for object-store content verification, SHA-1 and
//! SHA-256 for repository integrity checks. Callers feed data incrementally
//! through [`DigestContext::update`] and obtain the final hash as raw bytes
//! or lowercase hex; the result is independent of how the input was chunked.
//!
//! The algorithm is selected at run time via [`DigestAlgorithm`] so stream
//! pipelines can be composed from configuration without generic plumbing.

use digest::Digest as _;
use md5::Md5;
use sha1::Sha1;
use sha2::Sha256;
use types::{Error, Result};

/// Hash algorithm selector.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DigestAlgorithm {
    /// MD5, 16-byte digest.
    Md5,
    /// SHA-1, 20-byte digest.
    Sha1,
    /// SHA-256, 32-byte digest.
    Sha256,
}

impl DigestAlgorithm {
    /// Digest length in bytes.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
            Self::Sha256 => 32,
        }
    }

    /// Canonical lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }

    /// Looks an algorithm up by name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "md5" => Ok(Self::Md5),
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            _ => Err(Error::format(format!("invalid hash algorithm '{name}'"))),
        }
    }
}

#[derive(Clone)]
enum Inner {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
}

/// Incremental digest computation.
#[derive(Clone)]
pub struct DigestContext {
    algorithm: DigestAlgorithm,
    inner: Inner,
}

impl DigestContext {
    /// Creates an empty digest state for `algorithm`.
    #[must_use]
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        let inner = match algorithm {
            DigestAlgorithm::Md5 => Inner::Md5(Md5::new()),
            DigestAlgorithm::Sha1 => Inner::Sha1(Sha1::new()),
            DigestAlgorithm::Sha256 => Inner::Sha256(Sha256::new()),
        };

        Self { algorithm, inner }
    }

    /// Returns the algorithm this context computes.
    #[must_use]
    pub const fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Feeds more input into the digest state.
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.inner {
            Inner::Md5(state) => state.update(data),
            Inner::Sha1(state) => state.update(data),
            Inner::Sha256(state) => state.update(data),
        }
    }

    /// Finalizes and returns the raw digest.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        match self.inner {
            Inner::Md5(state) => state.finalize().to_vec(),
            Inner::Sha1(state) => state.finalize().to_vec(),
            Inner::Sha256(state) => state.finalize().to_vec(),
        }
    }

    /// Finalizes and returns the digest as lowercase hex.
    #[must_use]
    pub fn finish_hex(self) -> String {
        hex::encode(self.finish())
    }
}

/// Hashes `data` in one call.
#[must_use]
pub fn digest(algorithm: DigestAlgorithm, data: &[u8]) -> Vec<u8> {
    let mut context = DigestContext::new(algorithm);
    context.update(data);
    context.finish()
}

/// Hashes `data` in one call and renders lowercase hex.
#[must_use]
pub fn digest_hex(algorithm: DigestAlgorithm, data: &[u8]) -> String {
    hex::encode(digest(algorithm, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_vectors() {
        // Empty input
        assert_eq!(
            digest_hex(DigestAlgorithm::Md5, b""),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
        assert_eq!(
            digest_hex(DigestAlgorithm::Sha1, b""),
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
        assert_eq!(
            digest_hex(DigestAlgorithm::Sha256, b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );

        // Standard test string
        assert_eq!(
            digest_hex(DigestAlgorithm::Md5, b"abc"),
            "900150983cd24fb0d6963f7d28e17f72"
        );
        assert_eq!(
            digest_hex(DigestAlgorithm::Sha1, b"abc"),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            digest_hex(DigestAlgorithm::Sha256, b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn digest_is_chunking_independent() {
        let data = b"The quick brown fox jumps over the lazy dog".repeat(11);

        for algorithm in [DigestAlgorithm::Md5, DigestAlgorithm::Sha1, DigestAlgorithm::Sha256] {
            let whole = digest_hex(algorithm, &data);

            for chunk_size in [1, 3, 7, 64, 1000] {
                let mut context = DigestContext::new(algorithm);
                for chunk in data.chunks(chunk_size) {
                    context.update(chunk);
                }

                assert_eq!(context.finish_hex(), whole, "chunk size {chunk_size}");
            }
        }
    }

    #[test]
    fn digest_sizes_match() {
        for algorithm in [DigestAlgorithm::Md5, DigestAlgorithm::Sha1, DigestAlgorithm::Sha256] {
            assert_eq!(digest(algorithm, b"x").len(), algorithm.size());
        }
    }

    #[test]
    fn algorithm_names_round_trip() {
        for algorithm in [DigestAlgorithm::Md5, DigestAlgorithm::Sha1, DigestAlgorithm::Sha256] {
            assert_eq!(
                DigestAlgorithm::from_name(algorithm.name()).expect("known name"),
                algorithm
            );
        }

        assert!(DigestAlgorithm::from_name("crc32").is_err());
    }
}
