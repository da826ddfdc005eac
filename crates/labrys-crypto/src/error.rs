//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Symmetric key below the 256-bit floor
    #[error("insecure symmetric key size: need at least {minimum} bytes, got {actual}")]
    InsecureKeySize {
        /// Minimum acceptable size
        minimum: usize,
        /// Actual size supplied
        actual: usize,
    },

    /// Key length does not match the cipher
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Ciphertext is empty
    #[error("ciphertext is empty")]
    EmptyCiphertext,

    /// Ciphertext shorter than IV plus one block
    #[error("ciphertext too short to decrypt")]
    CiphertextTooShort,

    /// Ciphertext not a multiple of the block size
    #[error("ciphertext is not block-aligned")]
    CiphertextNotAligned,

    /// PKCS#7 padding check failed
    #[error("ciphertext is not padded according to PKCS#7")]
    InvalidPadding,

    /// Asymmetric encryption failed
    #[error("asymmetric encryption failed")]
    EncryptionFailed,

    /// Asymmetric decryption failed
    #[error("asymmetric decryption failed")]
    DecryptionFailed,

    /// Peer public key could not be parsed
    #[error("peer public key is not valid PKCS#1 PEM")]
    InvalidPublicKey,

    /// Operation requires a private key that was not loaded
    #[error("no private key loaded")]
    NoPrivateKey,

    /// RSA key generation failed
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// OS CSPRNG failure
    #[error("random number generation failed")]
    RandomFailed,
}
