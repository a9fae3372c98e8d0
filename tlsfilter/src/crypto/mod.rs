use std::borrow::Cow;
use std::fmt::Debug;
use std::sync::Arc;

use pki_types::PrivateKeyDer;
use zeroize::Zeroize;

use crate::error::Error;
use crate::suites::Tls12CipherSuite;

/// Pure-Rust CryptoProvider built on the RustCrypto crates.
pub mod rustcrypto;

/// TLS message encryption/decryption interfaces.
pub mod cipher;

/// Hashing interfaces.
pub mod hash;

/// HMAC interfaces.
pub mod hmac;

/// The TLS 1.0-1.2 pseudo-random functions.
pub mod tls12;

/// Controls core cryptography used by tlsfilter.
///
/// This crate comes with one built-in option, [`rustcrypto::default_provider()`].
/// Other providers can be assembled from the traits in this module: the
/// cipher suites, hash and HMAC primitives are plain `'static` trait objects.
///
/// # Using a custom key
///
/// Only [`KeyProvider`] and [`DecryptingKey`] need implementing to keep the
/// RSA private key somewhere else, such as an HSM.  Wire that in with
/// [`crate::ServerConfig::with_private_key`].
#[derive(Debug, Clone)]
pub struct CryptoProvider {
    /// List of supported cipher suites, in preference order -- the first element
    /// is the highest priority.
    pub cipher_suites: Cow<'static, [&'static Tls12CipherSuite]>,

    /// Primitives needed by TLS 1.0 and 1.1: the MD5 and SHA-1 hashes for the
    /// handshake transcript and their HMACs for the PRF.
    pub tls10: &'static Tls10Algorithms,

    /// Source of cryptographically secure random numbers.
    pub secure_random: &'static dyn SecureRandom,

    /// Provider for loading private [`DecryptingKey`]s from [`PrivateKeyDer`].
    pub key_provider: &'static dyn KeyProvider,
}

/// Hash functions and HMACs specific to the TLS 1.0/1.1 PRF and transcript.
pub struct Tls10Algorithms {
    /// MD5, for the transcript.
    pub md5: &'static dyn hash::Hash,
    /// SHA-1, for the transcript.
    pub sha1: &'static dyn hash::Hash,
    /// HMAC-MD5, for the PRF.
    pub hmac_md5: &'static dyn hmac::Hmac,
    /// HMAC-SHA1, for the PRF.
    pub hmac_sha1: &'static dyn hmac::Hmac,
}

impl Debug for Tls10Algorithms {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Tls10Algorithms")
    }
}

/// A source of cryptographically secure randomness.
pub trait SecureRandom: Send + Sync + Debug {
    /// Fill the given buffer with random bytes.
    ///
    /// The bytes must be sourced from a cryptographically secure random number
    /// generator seeded with good quality, secret entropy.
    fn fill(&self, buf: &mut [u8]) -> Result<(), GetRandomFailed>;
}

/// A mechanism for loading private [`DecryptingKey`]s from [`PrivateKeyDer`].
pub trait KeyProvider: Send + Sync + Debug {
    /// Decode and validate a private key from `key_der`.
    ///
    /// Return an error if the key type encoding is not supported, or if the key fails validation.
    fn load_private_key(
        &self,
        key_der: PrivateKeyDer<'static>,
    ) -> Result<Arc<dyn DecryptingKey>, Error>;
}

/// An RSA private key capability, bound to the leaf certificate.
///
/// RSA key exchange only ever needs PKCS#1 v1.5 decryption of the
/// client's encrypted premaster secret.
pub trait DecryptingKey: Send + Sync + Debug {
    /// Decrypt `ciphertext` under RSAES-PKCS1-v1_5.
    ///
    /// Any failure must be reported as an error, without detail; the caller
    /// substitutes a random premaster secret so that the failure is not
    /// observable to the peer.
    fn decrypt_pkcs1(&self, ciphertext: &[u8]) -> Result<Vec<u8>, Error>;

    /// Length of the public modulus, in bytes.
    fn modulus_len(&self) -> usize;
}

/// Random material generation failed.
#[derive(Debug)]
pub struct GetRandomFailed;

/// A premaster secret, as decrypted from ClientKeyExchange.
///
/// It is zeroized on drop.
pub(crate) struct PremasterSecret(pub(crate) [u8; 48]);

impl Drop for PremasterSecret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}
