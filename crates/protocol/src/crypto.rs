use rand::thread_rng;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use thiserror::Error;

/// RSA modulus size for session keys, in bits.
pub const KEY_BITS: usize = 2048;

/// SHA-256 digest length in bytes, fixed by the OAEP parameters.
const HASH_LEN: usize = 32;

/// Errors from key handling and the OAEP codec.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key generation failed: {0}")]
    KeyGen(rsa::Error),
    #[error("bad public key encoding: {0}")]
    Pem(#[from] rsa::pkcs8::spki::Error),
    #[error("peer key of {bits} bits is below the {} bit minimum", KEY_BITS)]
    KeyTooSmall { bits: usize },
    #[error("plaintext of {len} bytes exceeds the {max} byte capacity")]
    PlaintextTooLong { len: usize, max: usize },
    #[error("encryption failed: {0}")]
    Encrypt(rsa::Error),
    #[error("decryption failed")]
    Decrypt,
}

/// A session's RSA keypair. Each process generates its own at startup; the
/// private half never leaves it.
#[derive(Clone)]
pub struct KeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl KeyPair {
    /// Generate a fresh 2048-bit keypair.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut rng = thread_rng();
        let private = RsaPrivateKey::new(&mut rng, KEY_BITS).map_err(CryptoError::KeyGen)?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// Export the public half as SubjectPublicKeyInfo PEM for the handshake.
    pub fn public_key_pem(&self) -> Result<String, CryptoError> {
        Ok(self.public.to_public_key_pem(LineEnding::LF)?)
    }

    /// Decrypt an OAEP ciphertext that was sealed against this keypair.
    ///
    /// Failures are deliberately opaque; a wrong key, a truncated ciphertext
    /// and a tampered one are indistinguishable to callers.
    pub fn open(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.private
            .decrypt(Oaep::new::<Sha256>(), ciphertext)
            .map_err(|_| CryptoError::Decrypt)
    }
}

/// The remote side's public key, parsed from a handshake frame.
#[derive(Clone)]
pub struct PeerKey {
    key: RsaPublicKey,
}

impl PeerKey {
    /// Parse a peer's SubjectPublicKeyInfo PEM. Keys smaller than
    /// [`KEY_BITS`] are refused; both ends generate full-size moduli.
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        let key = RsaPublicKey::from_public_key_pem(pem)?;
        let bits = key.size() * 8;
        if bits < KEY_BITS {
            return Err(CryptoError::KeyTooSmall { bits });
        }
        Ok(Self { key })
    }

    /// Largest plaintext this key can seal under OAEP with SHA-256.
    pub fn max_plaintext_len(&self) -> usize {
        self.key.size().saturating_sub(2 * HASH_LEN + 2)
    }

    /// Encrypt a plaintext for the peer. Oversized input is rejected up
    /// front rather than truncated.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let max = self.max_plaintext_len();
        if plaintext.len() > max {
            return Err(CryptoError::PlaintextTooLong {
                len: plaintext.len(),
                max,
            });
        }
        let mut rng = thread_rng();
        self.key
            .encrypt(&mut rng, Oaep::new::<Sha256>(), plaintext)
            .map_err(CryptoError::Encrypt)
    }
}
