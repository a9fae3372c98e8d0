use core::fmt;
use std::sync::Arc;

use pki_types::{CertificateDer, PrivateKeyDer};

use crate::crypto::{rustcrypto, CryptoProvider, DecryptingKey};
use crate::error::Error;
use crate::key_log::{KeyLog, NoKeyLog};
use crate::msgs::message::MAX_FRAGMENT_LEN;
use crate::suites::Tls12CipherSuite;
use crate::versions::{self, SupportedProtocolVersion};

/// Common configuration for a set of server sessions.
///
/// Making one of these is cheap, though one of the inputs may be expensive:
/// parsing the RSA private key.  Share one `Arc<ServerConfig>` between all
/// connections using the same certificate.
///
/// # Defaults
///
/// * [`ServerConfig::cipher_suites`]: all five supported suites, strongest first.
/// * [`ServerConfig::versions`]: TLS 1.2, 1.1 and 1.0.
/// * [`ServerConfig::max_fragment_size`]: `None`, meaning 16384 byte records.
/// * [`ServerConfig::key_log`]: key material is not logged.
#[derive(Clone)]
pub struct ServerConfig {
    provider: Arc<CryptoProvider>,

    /// The certificate chain sent to clients, leaf first.  If empty, no
    /// Certificate message is sent.
    pub(crate) cert_chain: Arc<[CertificateDer<'static>]>,

    /// The private key bound to the leaf certificate.
    pub(crate) key: Arc<dyn DecryptingKey>,

    /// Cipher suites we are prepared to negotiate, in preference order.
    /// The client's order is ignored.
    pub cipher_suites: Vec<&'static Tls12CipherSuite>,

    /// Protocol versions we are prepared to negotiate.  The highest one is
    /// the ceiling the client's version is clamped to.
    pub versions: Vec<&'static SupportedProtocolVersion>,

    /// The maximum size of plaintext in each TLS record we send, or `None`
    /// for the default of 16384 bytes.  Set this with
    /// [`ServerConfig::set_max_fragment_size`].
    max_fragment_size: Option<usize>,

    /// How to output key material for debugging.  The default
    /// does nothing.
    pub key_log: Arc<dyn KeyLog>,
}

impl ServerConfig {
    /// Make a configuration using the built-in RustCrypto provider, from a
    /// certificate chain and the PKCS#1 or PKCS#8 encoded RSA private key of
    /// its leaf.
    pub fn new(
        cert_chain: Vec<CertificateDer<'static>>,
        key_der: PrivateKeyDer<'static>,
    ) -> Result<Self, Error> {
        Self::with_provider(cert_chain, key_der, rustcrypto::default_provider())
    }

    /// Like [`ServerConfig::new`], with the given crypto provider.
    ///
    /// The cipher suites offered are those of the provider.
    pub fn with_provider(
        cert_chain: Vec<CertificateDer<'static>>,
        key_der: PrivateKeyDer<'static>,
        provider: CryptoProvider,
    ) -> Result<Self, Error> {
        let key = provider
            .key_provider
            .load_private_key(key_der)?;
        Ok(Self::with_private_key(cert_chain, key, provider))
    }

    /// Make a configuration from an already-loaded private key capability,
    /// such as one backed by a hardware module.
    pub fn with_private_key(
        cert_chain: Vec<CertificateDer<'static>>,
        key: Arc<dyn DecryptingKey>,
        provider: CryptoProvider,
    ) -> Self {
        Self {
            cipher_suites: provider.cipher_suites.to_vec(),
            versions: versions::ALL_VERSIONS.to_vec(),
            provider: Arc::new(provider),
            cert_chain: cert_chain.into(),
            key,
            max_fragment_size: None,
            key_log: Arc::new(NoKeyLog {}),
        }
    }

    /// Set the largest plaintext length of the records we send.
    ///
    /// `Some(n)` must lie within `32..=32768`; `None` restores the default
    /// of 16384.  Received records are accepted up to the protocol limit
    /// regardless.
    pub fn set_max_fragment_size(&mut self, max_fragment_size: Option<usize>) -> Result<(), Error> {
        match max_fragment_size {
            Some(32..=MAX_FRAGMENT_LEN) | None => {
                self.max_fragment_size = max_fragment_size;
                Ok(())
            }
            Some(_) => Err(Error::BadMaxFragmentSize),
        }
    }

    /// The configured maximum record plaintext length, if not the default.
    pub fn max_fragment_size(&self) -> Option<usize> {
        self.max_fragment_size
    }

    /// The crypto provider used by connections made from this config.
    pub fn crypto_provider(&self) -> &Arc<CryptoProvider> {
        &self.provider
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("cert_chain_len", &self.cert_chain.len())
            .field("key", &self.key)
            .field("cipher_suites", &self.cipher_suites)
            .field("versions", &self.versions)
            .field("max_fragment_size", &self.max_fragment_size)
            .field("key_log", &self.key_log)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use pki_types::PrivatePkcs8KeyDer;

    use super::*;
    use crate::enums::CipherSuite;

    fn config() -> ServerConfig {
        let cert = CertificateDer::from(include_bytes!("../../tests/data/end.cert.der").to_vec());
        let key = PrivatePkcs8KeyDer::from(include_bytes!("../../tests/data/end.key.der").to_vec());
        ServerConfig::new(vec![cert], key.into()).unwrap()
    }

    #[test]
    fn defaults() {
        let config = config();
        assert_eq!(config.cipher_suites.len(), 5);
        assert_eq!(
            config.cipher_suites[0].suite(),
            CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA256
        );
        assert_eq!(config.versions.len(), 3);
        assert_eq!(config.max_fragment_size(), None);
        assert_eq!(config.cert_chain.len(), 1);
        assert_eq!(config.key.modulus_len(), 256);
    }

    #[test]
    fn max_fragment_size_bounds() {
        let mut config = config();
        assert_eq!(config.set_max_fragment_size(Some(31)), Err(Error::BadMaxFragmentSize));
        assert_eq!(
            config.set_max_fragment_size(Some(MAX_FRAGMENT_LEN + 1)),
            Err(Error::BadMaxFragmentSize)
        );
        assert_eq!(config.set_max_fragment_size(Some(32)), Ok(()));
        assert_eq!(config.max_fragment_size(), Some(32));
        assert_eq!(config.set_max_fragment_size(Some(MAX_FRAGMENT_LEN)), Ok(()));
        assert_eq!(config.set_max_fragment_size(None), Ok(()));
        assert_eq!(config.max_fragment_size(), None);
    }

    #[test]
    fn bad_key_is_rejected() {
        let key = PrivatePkcs8KeyDer::from(vec![0x30, 0x03, 0x02, 0x01, 0x00]);
        assert!(ServerConfig::new(Vec::new(), key.into()).is_err());
    }
}
