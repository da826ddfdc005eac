//! # labrys Crypto
//!
//! Cryptographic primitives for the labrys session protocol.
//!
//! This crate provides:
//! - AES-256-CBC with PKCS#7 padding for session records
//! - RSA-OAEP (SHA-1) envelopes for handshake records
//! - Secure random number generation
//!
//! The session engine consumes these only through the [`SymmetricCipher`]
//! and [`AsymmetricCipher`] seams, so alternative suites can be swapped in
//! without touching the protocol code.
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm |
//! |----------|-----------|
//! | Record encryption | AES-256-CBC + PKCS#7 |
//! | Handshake envelope | RSA-OAEP (SHA-1) |
//! | Public key encoding | PKCS#1 PEM |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod asymmetric;
pub mod error;
pub mod random;
pub mod symmetric;

pub use asymmetric::{AsymmetricCipher, RsaOaep};
pub use error::CryptoError;
pub use symmetric::{Aes256Cbc, SymmetricCipher};

use zeroize::{Zeroize, ZeroizeOnDrop};

/// AES block size in bytes
pub const AES_BLOCK_SIZE: usize = 16;

/// Symmetric session key size in bytes (256-bit)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Handshake random nonce size in bytes
pub const HANDSHAKE_RANDOM_SIZE: usize = 32;

/// A 32-byte symmetric session key, zeroized on drop.
///
/// Anything shorter than 256 bits is rejected outright; the key is what the
/// whole post-handshake record stream is encrypted under.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey(Vec<u8>);

impl SessionKey {
    /// Build a session key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InsecureKeySize`] for keys shorter than
    /// [`SYMMETRIC_KEY_SIZE`], and [`CryptoError::InvalidKeyLength`] for
    /// anything that is not exactly the AES-256 key size.
    pub fn new(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < SYMMETRIC_KEY_SIZE {
            return Err(CryptoError::InsecureKeySize {
                minimum: SYMMETRIC_KEY_SIZE,
                actual: bytes.len(),
            });
        }
        if bytes.len() != SYMMETRIC_KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: SYMMETRIC_KEY_SIZE,
                actual: bytes.len(),
            });
        }
        Ok(Self(bytes.to_vec()))
    }

    /// Generate a fresh random session key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::RandomFailed`] if the OS CSPRNG fails.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut buf = [0u8; SYMMETRIC_KEY_SIZE];
        random::fill_random(&mut buf)?;
        let key = Self(buf.to_vec());
        buf.zeroize();
        Ok(key)
    }

    /// Raw key bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}
