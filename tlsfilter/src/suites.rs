use core::fmt;

use crate::crypto;
use crate::crypto::cipher::CbcMode;
use crate::enums::{CipherSuite, ProtocolVersion};

/// Common state for cipher suites.
pub struct CipherSuiteCommon {
    /// The TLS enumeration naming this cipher suite.
    pub suite: CipherSuite,

    /// Which hash function the suite uses for the TLS 1.2 handshake
    /// transcript.
    pub hash_provider: &'static dyn crypto::hash::Hash,
}

/// A TLS 1.0-1.2 cipher suite with RSA key exchange and CBC record
/// protection.
pub struct Tls12CipherSuite {
    /// Common cipher suite fields.
    pub common: CipherSuiteCommon,

    /// The earliest protocol version this suite may be negotiated for.
    ///
    /// Suites with a SHA-256 MAC were introduced with TLS 1.2.
    pub min_version: ProtocolVersion,

    /// The block cipher used for record protection.
    pub bulk: &'static dyn CbcMode,

    /// The HMAC used for record protection.
    pub mac: &'static dyn crypto::hmac::Hmac,

    /// The HMAC used by the TLS 1.2 PRF.
    ///
    /// TLS 1.0 and 1.1 ignore this and always use the MD5/SHA-1 PRF.
    pub prf_provider: &'static dyn crypto::hmac::Hmac,
}

impl Tls12CipherSuite {
    /// The cipher suite's identifier
    pub fn suite(&self) -> CipherSuite {
        self.common.suite
    }

    /// Length of the record MAC key, which is also the MAC length.
    pub fn mac_key_len(&self) -> usize {
        self.mac.hash_output_len()
    }

    /// Can this suite be used with `version`?
    pub fn usable_for_version(&self, version: ProtocolVersion) -> bool {
        version.get_u16() >= self.min_version.get_u16()
    }
}

impl PartialEq for Tls12CipherSuite {
    fn eq(&self, other: &Self) -> bool {
        self.common.suite == other.common.suite
    }
}

impl fmt::Debug for Tls12CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tls12CipherSuite")
            .field("suite", &self.common.suite)
            .field("min_version", &self.min_version)
            .finish()
    }
}

/// Pick the first suite in `server_suites` that the client offered and that
/// works with `version`.
///
/// Server preference wins, so the order the client listed its suites in is
/// irrelevant.
pub(crate) fn choose_ciphersuite_preferring_server(
    client_suites: &[CipherSuite],
    server_suites: &[&'static Tls12CipherSuite],
    version: ProtocolVersion,
) -> Option<&'static Tls12CipherSuite> {
    server_suites
        .iter()
        .find(|x| x.usable_for_version(version) && client_suites.contains(&x.suite()))
        .copied()
}
