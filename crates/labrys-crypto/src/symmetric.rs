//! AES-256-CBC record encryption.
//!
//! Ciphertext layout is `iv (16 bytes) || blocks`; a fresh IV is drawn from
//! the OS CSPRNG for every encryption. Padding is PKCS#7.

use aes::Aes256;
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::{AES_BLOCK_SIZE, CryptoError, SYMMETRIC_KEY_SIZE, random};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Symmetric cipher seam used for all post-handshake records.
///
/// The key is passed per call rather than held by the cipher; the engine
/// owns the key material and the cipher stays stateless.
pub trait SymmetricCipher: Send + Sync {
    /// Encrypt a plaintext under the given key
    fn encrypt(&self, plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Decrypt a ciphertext under the given key
    fn decrypt(&self, ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// AES-256-CBC with PKCS#7 padding
#[derive(Debug, Default, Clone, Copy)]
pub struct Aes256Cbc;

impl Aes256Cbc {
    /// Create a new cipher instance
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn check_key(key: &[u8]) -> Result<(), CryptoError> {
        if key.len() != SYMMETRIC_KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: SYMMETRIC_KEY_SIZE,
                actual: key.len(),
            });
        }
        Ok(())
    }
}

impl SymmetricCipher for Aes256Cbc {
    fn encrypt(&self, plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Self::check_key(key)?;

        let mut iv = [0u8; AES_BLOCK_SIZE];
        random::fill_random(&mut iv)?;

        let enc = Aes256CbcEnc::new_from_slices(key, &iv).map_err(|_| {
            CryptoError::InvalidKeyLength {
                expected: SYMMETRIC_KEY_SIZE,
                actual: key.len(),
            }
        })?;

        let blocks = enc.encrypt_padded_vec_mut::<Pkcs7>(plaintext);
        let mut out = Vec::with_capacity(AES_BLOCK_SIZE + blocks.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&blocks);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Self::check_key(key)?;

        if ciphertext.is_empty() {
            return Err(CryptoError::EmptyCiphertext);
        }
        // The IV occupies the first block; at least one data block must follow.
        if ciphertext.len() < 2 * AES_BLOCK_SIZE {
            return Err(CryptoError::CiphertextTooShort);
        }

        let (iv, blocks) = ciphertext.split_at(AES_BLOCK_SIZE);
        if blocks.len() % AES_BLOCK_SIZE != 0 {
            return Err(CryptoError::CiphertextNotAligned);
        }

        let dec = Aes256CbcDec::new_from_slices(key, iv).map_err(|_| {
            CryptoError::InvalidKeyLength {
                expected: SYMMETRIC_KEY_SIZE,
                actual: key.len(),
            }
        })?;

        dec.decrypt_padded_vec_mut::<Pkcs7>(blocks)
            .map_err(|_| CryptoError::InvalidPadding)
    }
}
