//! RSA-OAEP handshake envelopes.
//!
//! ClientHello records carry the symmetric session key, so they are sealed
//! to the server's long-term RSA public key. The client side only ever
//! encrypts; the decrypt direction exists for tooling and test harnesses
//! that play the server.

use rsa::pkcs1::{DecodeRsaPublicKey, EncodeRsaPublicKey, LineEnding};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;

use crate::CryptoError;

/// Asymmetric cipher seam used for the handshake envelope.
pub trait AsymmetricCipher: Send + Sync {
    /// Encrypt a payload to a peer's public key (PKCS#1 PEM bytes)
    fn encrypt(&self, plaintext: &[u8], peer_public_key: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Decrypt a payload with the local private key
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// The local public key as PKCS#1 PEM bytes
    fn public_key(&self) -> Result<Vec<u8>, CryptoError>;
}

/// RSA-OAEP with SHA-1 (the digest the game server speaks)
pub struct RsaOaep {
    private_key: Option<RsaPrivateKey>,
}

impl RsaOaep {
    /// Encrypt-only instance, as used by the client: it seals handshake
    /// records to the server's key and never decrypts anything asymmetric.
    #[must_use]
    pub fn encrypt_only() -> Self {
        Self { private_key: None }
    }

    /// Full instance around an existing private key
    #[must_use]
    pub fn new(private_key: RsaPrivateKey) -> Self {
        Self {
            private_key: Some(private_key),
        }
    }

    /// Generate a fresh keypair of the given modulus size.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyGeneration`] if the RSA key cannot be built.
    pub fn generate(bits: usize) -> Result<Self, CryptoError> {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, bits)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        Ok(Self::new(private_key))
    }
}

impl AsymmetricCipher for RsaOaep {
    fn encrypt(&self, plaintext: &[u8], peer_public_key: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let pem =
            std::str::from_utf8(peer_public_key).map_err(|_| CryptoError::InvalidPublicKey)?;
        let public_key =
            RsaPublicKey::from_pkcs1_pem(pem).map_err(|_| CryptoError::InvalidPublicKey)?;

        let mut rng = rand::thread_rng();
        public_key
            .encrypt(&mut rng, Oaep::new::<Sha1>(), plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let private_key = self.private_key.as_ref().ok_or(CryptoError::NoPrivateKey)?;
        private_key
            .decrypt(Oaep::new::<Sha1>(), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }

    fn public_key(&self) -> Result<Vec<u8>, CryptoError> {
        let private_key = self.private_key.as_ref().ok_or(CryptoError::NoPrivateKey)?;
        let pem = private_key
            .to_public_key()
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(pem.into_bytes())
    }
}
