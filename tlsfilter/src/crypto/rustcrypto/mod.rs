use std::borrow::Cow;
use std::sync::Arc;

use pki_types::PrivateKeyDer;
use rand_core::RngCore;

use crate::crypto::{
    CryptoProvider, DecryptingKey, GetRandomFailed, KeyProvider, SecureRandom, Tls10Algorithms,
};
use crate::enums::{CipherSuite, ProtocolVersion};
use crate::error::Error;
use crate::suites::{CipherSuiteCommon, Tls12CipherSuite};

pub(crate) mod block;
pub(crate) mod hash;
pub(crate) mod hmac;
mod rsa;

pub use self::rsa::RsaDecryptingKey;

/// A `CryptoProvider` backed by the RustCrypto crates and the operating
/// system's random number generator.
pub fn default_provider() -> CryptoProvider {
    CryptoProvider {
        cipher_suites: Cow::Borrowed(ALL_CIPHER_SUITES),
        tls10: &TLS10_ALGORITHMS,
        secure_random: &Provider,
        key_provider: &Provider,
    }
}

#[derive(Debug)]
struct Provider;

impl SecureRandom for Provider {
    fn fill(&self, bytes: &mut [u8]) -> Result<(), GetRandomFailed> {
        rand_core::OsRng
            .try_fill_bytes(bytes)
            .map_err(|_| GetRandomFailed)
    }
}

impl KeyProvider for Provider {
    fn load_private_key(
        &self,
        key_der: PrivateKeyDer<'static>,
    ) -> Result<Arc<dyn DecryptingKey>, Error> {
        RsaDecryptingKey::load(key_der)
    }
}

static TLS10_ALGORITHMS: Tls10Algorithms = Tls10Algorithms {
    md5: &hash::MD5,
    sha1: &hash::SHA1,
    hmac_md5: &hmac::HMAC_MD5,
    hmac_sha1: &hmac::HMAC_SHA1,
};

/// The cipher suites supported by this provider, in server preference order:
/// AES-256 before AES-128, SHA-256 MACs before SHA-1, 3DES last.
pub static ALL_CIPHER_SUITES: &[&Tls12CipherSuite] = &[
    TLS_RSA_WITH_AES_256_CBC_SHA256,
    TLS_RSA_WITH_AES_256_CBC_SHA,
    TLS_RSA_WITH_AES_128_CBC_SHA256,
    TLS_RSA_WITH_AES_128_CBC_SHA,
    TLS_RSA_WITH_3DES_EDE_CBC_SHA,
];

/// The TLS_RSA_WITH_AES_256_CBC_SHA256 cipher suite.  TLS 1.2 only.
pub static TLS_RSA_WITH_AES_256_CBC_SHA256: &Tls12CipherSuite = &Tls12CipherSuite {
    common: CipherSuiteCommon {
        suite: CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA256,
        hash_provider: &hash::SHA256,
    },
    min_version: ProtocolVersion::TLSv1_2,
    bulk: &block::AES_256_CBC,
    mac: &hmac::HMAC_SHA256,
    prf_provider: &hmac::HMAC_SHA256,
};

/// The TLS_RSA_WITH_AES_256_CBC_SHA cipher suite.
pub static TLS_RSA_WITH_AES_256_CBC_SHA: &Tls12CipherSuite = &Tls12CipherSuite {
    common: CipherSuiteCommon {
        suite: CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA,
        hash_provider: &hash::SHA256,
    },
    min_version: ProtocolVersion::TLSv1_0,
    bulk: &block::AES_256_CBC,
    mac: &hmac::HMAC_SHA1,
    prf_provider: &hmac::HMAC_SHA256,
};

/// The TLS_RSA_WITH_AES_128_CBC_SHA256 cipher suite.  TLS 1.2 only.
pub static TLS_RSA_WITH_AES_128_CBC_SHA256: &Tls12CipherSuite = &Tls12CipherSuite {
    common: CipherSuiteCommon {
        suite: CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA256,
        hash_provider: &hash::SHA256,
    },
    min_version: ProtocolVersion::TLSv1_2,
    bulk: &block::AES_128_CBC,
    mac: &hmac::HMAC_SHA256,
    prf_provider: &hmac::HMAC_SHA256,
};

/// The TLS_RSA_WITH_AES_128_CBC_SHA cipher suite.
pub static TLS_RSA_WITH_AES_128_CBC_SHA: &Tls12CipherSuite = &Tls12CipherSuite {
    common: CipherSuiteCommon {
        suite: CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
        hash_provider: &hash::SHA256,
    },
    min_version: ProtocolVersion::TLSv1_0,
    bulk: &block::AES_128_CBC,
    mac: &hmac::HMAC_SHA1,
    prf_provider: &hmac::HMAC_SHA256,
};

/// The TLS_RSA_WITH_3DES_EDE_CBC_SHA cipher suite.
pub static TLS_RSA_WITH_3DES_EDE_CBC_SHA: &Tls12CipherSuite = &Tls12CipherSuite {
    common: CipherSuiteCommon {
        suite: CipherSuite::TLS_RSA_WITH_3DES_EDE_CBC_SHA,
        hash_provider: &hash::SHA256,
    },
    min_version: ProtocolVersion::TLSv1_0,
    bulk: &block::DES_EDE3_CBC,
    mac: &hmac::HMAC_SHA1,
    prf_provider: &hmac::HMAC_SHA256,
};
