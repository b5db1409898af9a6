#![deny(unsafe_code)]

//! # Overview
//!
//! Repository encryption and content hashing for the pipeline.
//!
//! [`CipherEncrypt`] and [`CipherDecrypt`] implement AES-256-CBC with PKCS#7
//! padding in the OpenSSL salted-stream format: the ciphertext is preceded
//! by the 8-byte magic `Salted__` and an 8-byte salt, and key plus IV are
//! derived from passphrase and salt with a single-round SHA-256 bytes-to-key
//! construction. Decryption verifies the magic and rejects bad padding as
//! `CryptoError`, which is also what a wrong passphrase looks like.
//!
//! [`HashFilter`] observes a stream and publishes the digest as lowercase
//! hex, independent of how the stream was chunked.

mod block;
mod hash;
mod kdf;

pub use block::{CipherDecrypt, CipherEncrypt, CIPHER_FILTER_TYPE};
pub use hash::{HashFilter, HASH_FILTER_TYPE};
pub use kdf::derive_key_iv;
