//! AES-256-CBC stream filters in the OpenSSL salted format.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use types::{Buffer, Error, ErrorKind, Result, StringId, StringIdBits};
use vault_io::StreamFilter;

use crate::kdf::derive_key_iv;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Filter type id shared by the encrypt and decrypt filters.
pub const CIPHER_FILTER_TYPE: StringId = StringId::pack(StringIdBits::Bit5, "cipher-blk");

/// Stream header magic, as OpenSSL writes it.
const MAGIC: &[u8; 8] = b"Salted__";

/// Salt length carried in the stream header.
const SALT_SIZE: usize = 8;

/// Magic plus salt.
const HEADER_SIZE: usize = MAGIC.len() + SALT_SIZE;

/// AES block length.
const BLOCK_SIZE: usize = 16;

fn crypto_error(message: &str) -> Error {
    Error::new(ErrorKind::Crypto, message)
}

/// Encrypting filter.
///
/// Prepends `Salted__` and the salt, then emits CBC ciphertext; the PKCS#7
/// padded final block is produced on flush. Output is metered against the
/// space the pipeline offers, with `input_same` signalling an emission
/// backlog.
pub struct CipherEncrypt {
    encryptor: Aes256CbcEnc,
    salt: [u8; SALT_SIZE],
    partial: Vec<u8>,
    pending: Vec<u8>,
    pos: usize,
    header_written: bool,
    finalized: bool,
    input_same: bool,
    flushing: bool,
    done: bool,
}

impl CipherEncrypt {
    /// Creates an encryptor for `passphrase`.
    ///
    /// The salt is drawn from the OS RNG unless supplied explicitly.
    #[must_use]
    pub fn new(passphrase: &[u8], salt: Option<[u8; SALT_SIZE]>) -> Self {
        let salt = salt.unwrap_or_else(rand::random);
        let (key, iv) = derive_key_iv(passphrase, &salt, 1);

        Self {
            encryptor: Aes256CbcEnc::new(&key.into(), &iv.into()),
            salt,
            partial: Vec::new(),
            pending: Vec::new(),
            pos: 0,
            header_written: false,
            finalized: false,
            input_same: false,
            flushing: false,
            done: false,
        }
    }

    fn write_header(&mut self) {
        if !self.header_written {
            self.pending.extend_from_slice(MAGIC);
            self.pending.extend_from_slice(&self.salt);
            self.header_written = true;
        }
    }

    fn encrypt_blocks(&mut self, data: &[u8]) {
        let mut combined = std::mem::take(&mut self.partial);
        combined.extend_from_slice(data);

        let full = combined.len() / BLOCK_SIZE * BLOCK_SIZE;

        for chunk in combined[..full].chunks(BLOCK_SIZE) {
            let mut block = GenericArray::clone_from_slice(chunk);
            self.encryptor.encrypt_block_mut(&mut block);
            self.pending.extend_from_slice(&block);
        }

        self.partial = combined[full..].to_vec();
    }

    fn emit(&mut self, out: &mut Buffer) {
        let taken = out.append_limited(&self.pending[self.pos..]);
        self.pos += taken;

        if self.pos == self.pending.len() {
            self.pending.clear();
            self.pos = 0;
        }
    }
}

impl StreamFilter for CipherEncrypt {
    fn kind(&self) -> StringId {
        CIPHER_FILTER_TYPE
    }

    fn process(&mut self, input: Option<&Buffer>, out: &mut Buffer) -> Result<()> {
        if self.done {
            return Err(Error::assert("cipher filter is done"));
        }

        match input {
            Some(input) => {
                if !self.input_same {
                    self.write_header();
                    self.encrypt_blocks(input.bytes());
                }

                self.emit(out);
                self.input_same = !self.pending.is_empty();
            }
            None => {
                self.flushing = true;
                self.input_same = false;

                if !self.finalized {
                    self.write_header();

                    // PKCS#7: a full padding block when the input was
                    // block-aligned
                    let pad = BLOCK_SIZE - self.partial.len();
                    let padding = vec![pad as u8; pad];
                    self.encrypt_blocks(&padding);
                    self.finalized = true;
                }

                self.emit(out);

                if self.pending.is_empty() {
                    self.done = true;
                }
            }
        }

        Ok(())
    }

    fn done(&self) -> bool {
        self.done
    }

    fn input_same(&self) -> bool {
        self.input_same
    }
}

/// Decrypting filter.
///
/// Consumes and verifies the salted header, decrypts CBC blocks, and strips
/// the PKCS#7 padding on flush. A bad magic or bad padding - the visible
/// symptom of a wrong passphrase - is a `CryptoError`.
pub struct CipherDecrypt {
    passphrase: Vec<u8>,
    decryptor: Option<Aes256CbcDec>,
    header: Vec<u8>,
    partial: Vec<u8>,
    held: Option<[u8; BLOCK_SIZE]>,
    pending: Vec<u8>,
    pos: usize,
    finalized: bool,
    input_same: bool,
    flushing: bool,
    done: bool,
}

impl CipherDecrypt {
    /// Creates a decryptor for `passphrase`. The salt arrives in the stream.
    #[must_use]
    pub fn new(passphrase: &[u8]) -> Self {
        Self {
            passphrase: passphrase.to_vec(),
            decryptor: None,
            header: Vec::new(),
            partial: Vec::new(),
            held: None,
            pending: Vec::new(),
            pos: 0,
            finalized: false,
            input_same: false,
            flushing: false,
            done: false,
        }
    }

    fn consume<'a>(&mut self, mut data: &'a [u8]) -> Result<&'a [u8]> {
        // The 16-byte header comes first and carries the salt
        if self.decryptor.is_none() {
            let need = HEADER_SIZE - self.header.len();
            let take = need.min(data.len());
            self.header.extend_from_slice(&data[..take]);
            data = &data[take..];

            if self.header.len() == HEADER_SIZE {
                if &self.header[..MAGIC.len()] != MAGIC {
                    return Err(crypto_error("cipher header invalid"));
                }

                let (key, iv) = derive_key_iv(&self.passphrase, &self.header[MAGIC.len()..], 1);
                self.decryptor = Some(Aes256CbcDec::new(&key.into(), &iv.into()));
            }
        }

        Ok(data)
    }

    fn decrypt_blocks(&mut self, data: &[u8]) {
        let Some(decryptor) = self.decryptor.as_mut() else {
            return;
        };

        let mut combined = std::mem::take(&mut self.partial);
        combined.extend_from_slice(data);

        let full = combined.len() / BLOCK_SIZE * BLOCK_SIZE;

        for chunk in combined[..full].chunks(BLOCK_SIZE) {
            let mut block = GenericArray::clone_from_slice(chunk);
            decryptor.decrypt_block_mut(&mut block);

            // Hold the newest block back; it may carry the padding
            if let Some(previous) = self.held.replace(block.into()) {
                self.pending.extend_from_slice(&previous);
            }
        }

        self.partial = combined[full..].to_vec();
    }

    fn emit(&mut self, out: &mut Buffer) {
        let taken = out.append_limited(&self.pending[self.pos..]);
        self.pos += taken;

        if self.pos == self.pending.len() {
            self.pending.clear();
            self.pos = 0;
        }
    }
}

impl StreamFilter for CipherDecrypt {
    fn kind(&self) -> StringId {
        CIPHER_FILTER_TYPE
    }

    fn process(&mut self, input: Option<&Buffer>, out: &mut Buffer) -> Result<()> {
        if self.done {
            return Err(Error::assert("cipher filter is done"));
        }

        match input {
            Some(input) => {
                if !self.input_same {
                    let data = self.consume(input.bytes())?;
                    self.decrypt_blocks(data);
                }

                self.emit(out);
                self.input_same = !self.pending.is_empty();
            }
            None => {
                self.flushing = true;
                self.input_same = false;

                if !self.finalized {
                    if self.decryptor.is_none() || !self.partial.is_empty() {
                        return Err(crypto_error("cipher data invalid"));
                    }

                    let held = self
                        .held
                        .take()
                        .ok_or_else(|| crypto_error("cipher data missing"))?;

                    let pad = held[BLOCK_SIZE - 1] as usize;

                    if pad == 0 || pad > BLOCK_SIZE
                        || held[BLOCK_SIZE - pad..].iter().any(|&byte| byte != pad as u8)
                    {
                        return Err(crypto_error("cipher padding invalid"));
                    }

                    self.pending.extend_from_slice(&held[..BLOCK_SIZE - pad]);
                    self.finalized = true;
                }

                self.emit(out);

                if self.pending.is_empty() {
                    self.done = true;
                }
            }
        }

        Ok(())
    }

    fn done(&self) -> bool {
        self.done
    }

    fn input_same(&self) -> bool {
        self.input_same
    }
}

#[cfg(test)]
mod tests {
    use vault_io::{shared_buffer, BufferWrite, Filter, IoWrite};

    use super::*;

    const PASSPHRASE: &[u8] = b"12345678";
    const SALT: [u8; 8] = [1, 2, 3, 4, 5, 6, 7, 8];

    /// Deterministic pseudo-random payload.
    fn seeded_bytes(count: usize) -> Vec<u8> {
        let mut state: u32 = 0x2545_f491;
        (0..count)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (state >> 16) as u8
            })
            .collect()
    }

    fn pump(filters: Vec<Filter>, input: &[u8], chunk: usize) -> Result<Vec<u8>> {
        let target = shared_buffer();
        let mut io = IoWrite::with_buffer_size(Box::new(BufferWrite::new(target.clone())), 256);

        for filter in filters {
            io.filter_group_mut().push(filter)?;
        }

        io.open()?;

        for part in input.chunks(chunk.max(1)) {
            io.write(&Buffer::from_slice(part))?;
        }

        io.close()?;

        let result = target.borrow().bytes().to_vec();
        Ok(result)
    }

    #[test]
    fn encrypted_size_is_plaintext_plus_header_plus_padding() {
        let plaintext = seeded_bytes(5000);

        let encrypted = pump(
            vec![Filter::stream(CipherEncrypt::new(PASSPHRASE, Some(SALT)))],
            &plaintext,
            977,
        )
        .expect("encrypt");

        // 16 header bytes plus padding to the next block boundary
        assert_eq!(encrypted.len(), 5000 + 16 + 8);
        assert_eq!(&encrypted[..8], b"Salted__");
        assert_eq!(&encrypted[8..16], &SALT);

        let decrypted = pump(
            vec![Filter::stream(CipherDecrypt::new(PASSPHRASE))],
            &encrypted,
            977,
        )
        .expect("decrypt");

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn round_trip_is_chunking_independent() {
        let plaintext = seeded_bytes(333);

        let reference = pump(
            vec![Filter::stream(CipherEncrypt::new(PASSPHRASE, Some(SALT)))],
            &plaintext,
            333,
        )
        .expect("encrypt");

        for chunk in [1, 7, 16, 100] {
            let encrypted = pump(
                vec![Filter::stream(CipherEncrypt::new(PASSPHRASE, Some(SALT)))],
                &plaintext,
                chunk,
            )
            .expect("encrypt");
            assert_eq!(encrypted, reference, "chunk {chunk}");

            let decrypted = pump(
                vec![Filter::stream(CipherDecrypt::new(PASSPHRASE))],
                &encrypted,
                chunk,
            )
            .expect("decrypt");
            assert_eq!(decrypted, plaintext, "chunk {chunk}");
        }
    }

    #[test]
    fn block_aligned_input_gets_a_full_padding_block() {
        let plaintext = seeded_bytes(32);

        let encrypted = pump(
            vec![Filter::stream(CipherEncrypt::new(PASSPHRASE, Some(SALT)))],
            &plaintext,
            32,
        )
        .expect("encrypt");

        assert_eq!(encrypted.len(), 16 + 32 + 16);
    }

    #[test]
    fn empty_stream_encrypts_to_header_plus_one_block() {
        let encrypted = pump(
            vec![Filter::stream(CipherEncrypt::new(PASSPHRASE, Some(SALT)))],
            b"",
            1,
        )
        .expect("encrypt");

        assert_eq!(encrypted.len(), 16 + 16);

        let decrypted = pump(
            vec![Filter::stream(CipherDecrypt::new(PASSPHRASE))],
            &encrypted,
            7,
        )
        .expect("decrypt");
        assert!(decrypted.is_empty());
    }

    #[test]
    fn random_salt_differs_but_round_trips() {
        let plaintext = b"same plaintext";

        let first = pump(
            vec![Filter::stream(CipherEncrypt::new(PASSPHRASE, None))],
            plaintext,
            7,
        )
        .expect("encrypt");
        let second = pump(
            vec![Filter::stream(CipherEncrypt::new(PASSPHRASE, None))],
            plaintext,
            7,
        )
        .expect("encrypt");

        assert_ne!(first, second, "salts must differ");

        let decrypted = pump(
            vec![Filter::stream(CipherDecrypt::new(PASSPHRASE))],
            &first,
            7,
        )
        .expect("decrypt");
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn wrong_passphrase_is_a_crypto_error() {
        let encrypted = pump(
            vec![Filter::stream(CipherEncrypt::new(PASSPHRASE, Some(SALT)))],
            b"some plaintext",
            7,
        )
        .expect("encrypt");

        // A wrong key almost always surfaces as bad padding; in the rare
        // case the garbage padding is well-formed the plaintext is still
        // garbage
        match pump(
            vec![Filter::stream(CipherDecrypt::new(b"not the passphrase"))],
            &encrypted,
            7,
        ) {
            Err(error) => assert_eq!(error.kind(), ErrorKind::Crypto),
            Ok(decrypted) => assert_ne!(decrypted, b"some plaintext"),
        }
    }

    #[test]
    fn bad_magic_is_a_crypto_error() {
        let error = pump(
            vec![Filter::stream(CipherDecrypt::new(PASSPHRASE))],
            b"NotSalt_XXXXXXXXzzzzzzzzzzzzzzzz",
            8,
        )
        .expect_err("bad magic");
        assert_eq!(error.kind(), ErrorKind::Crypto);
    }

    #[test]
    fn truncated_stream_is_a_crypto_error() {
        let mut encrypted = pump(
            vec![Filter::stream(CipherEncrypt::new(PASSPHRASE, Some(SALT)))],
            b"some plaintext worth several blocks of ciphertext",
            7,
        )
        .expect("encrypt");
        encrypted.truncate(encrypted.len() - 5);

        let error = pump(
            vec![Filter::stream(CipherDecrypt::new(PASSPHRASE))],
            &encrypted,
            7,
        )
        .expect_err("truncated");
        assert_eq!(error.kind(), ErrorKind::Crypto);
    }
}
