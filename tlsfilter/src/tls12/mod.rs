use core::fmt;

use zeroize::Zeroize;

use crate::common_state::Side;
use crate::crypto::cipher::{MessageDecrypter, MessageEncrypter};
use crate::crypto::{hash, tls12 as prf, SecureRandom, Tls10Algorithms};
use crate::msgs::handshake::Random;
use crate::suites::Tls12CipherSuite;
use crate::versions::{PrfKind, SupportedProtocolVersion};

mod cipher;

pub(crate) use cipher::{CbcMessageDecrypter, CbcMessageEncrypter};

/// The decrypter and encrypter for one side of a connection.
pub type MessageCipherPair = (Box<dyn MessageDecrypter>, Box<dyn MessageEncrypter>);

/// Both sides' hello randoms.
#[derive(Clone, Copy)]
pub struct ConnectionRandoms {
    /// The ClientHello random.
    pub client: [u8; 32],
    /// The ServerHello random.
    pub server: [u8; 32],
}

impl ConnectionRandoms {
    /// Pair up the two hello randoms.
    pub fn new(client: Random, server: Random) -> Self {
        Self {
            client: client.0,
            server: server.0,
        }
    }
}

fn join_randoms(first: &[u8; 32], second: &[u8; 32]) -> [u8; 64] {
    let mut randoms = [0u8; 64];
    randoms[..32].copy_from_slice(first);
    randoms[32..].copy_from_slice(second);
    randoms
}

/// TLS 1.0-1.2 secrets tied to a particular connection.
pub struct ConnectionSecrets {
    randoms: ConnectionRandoms,
    suite: &'static Tls12CipherSuite,
    version: &'static SupportedProtocolVersion,
    tls10: &'static Tls10Algorithms,
    master_secret: [u8; 48],
}

impl ConnectionSecrets {
    /// Derive the master secret from the 48-byte premaster secret.
    ///
    /// `master_secret = PRF(premaster, "master secret", client_random || server_random)`
    pub fn from_premaster(
        premaster: &[u8],
        randoms: ConnectionRandoms,
        suite: &'static Tls12CipherSuite,
        version: &'static SupportedProtocolVersion,
        tls10: &'static Tls10Algorithms,
    ) -> Self {
        let mut ret = Self {
            randoms,
            suite,
            version,
            tls10,
            master_secret: [0u8; 48],
        };

        let seed = join_randoms(&ret.randoms.client, &ret.randoms.server);
        let mut master_secret = [0u8; 48];
        ret.prf(&mut master_secret, premaster, b"master secret", &seed);
        ret.master_secret = master_secret;
        master_secret.zeroize();
        ret
    }

    /// Make the record protection for `side` of the connection.
    ///
    /// The key block is sliced into client MAC key, server MAC key, client
    /// key, server key, client IV, server IV in that order.  The IVs only
    /// matter for TLS 1.0, which chains CBC state across records.
    pub fn make_cipher_pair(
        &self,
        side: Side,
        secure_random: &'static dyn SecureRandom,
    ) -> MessageCipherPair {
        let suite = self.suite;
        let mac_len = suite.mac_key_len();
        let key_len = suite.bulk.key_len();
        let iv_len = suite.bulk.block_len();

        let mut key_block = self.make_key_block();

        let (client_write_mac, rest) = key_block.split_at(mac_len);
        let (server_write_mac, rest) = rest.split_at(mac_len);
        let (client_write_key, rest) = rest.split_at(key_len);
        let (server_write_key, rest) = rest.split_at(key_len);
        let (client_write_iv, server_write_iv) = rest.split_at(iv_len);

        let (write_mac, write_key, write_iv, read_mac, read_key, read_iv) = match side {
            Side::Client => (
                client_write_mac,
                client_write_key,
                client_write_iv,
                server_write_mac,
                server_write_key,
                server_write_iv,
            ),
            Side::Server => (
                server_write_mac,
                server_write_key,
                server_write_iv,
                client_write_mac,
                client_write_key,
                client_write_iv,
            ),
        };

        let iv_mode = self.version.iv_mode;
        let pair: MessageCipherPair = (
            Box::new(CbcMessageDecrypter::new(
                suite, iv_mode, read_key, read_mac, read_iv,
            )),
            Box::new(CbcMessageEncrypter::new(
                suite,
                iv_mode,
                write_key,
                write_mac,
                write_iv,
                secure_random,
            )),
        );

        key_block.zeroize();
        pair
    }

    fn make_key_block(&self) -> Vec<u8> {
        let suite = self.suite;
        let len = (suite.mac_key_len() + suite.bulk.key_len() + suite.bulk.block_len()) * 2;
        let mut out = vec![0u8; len];

        // NOTE: server random first here, unlike the master secret.
        let randoms = join_randoms(&self.randoms.server, &self.randoms.client);
        self.prf(&mut out, &self.master_secret, b"key expansion", &randoms);
        out
    }

    fn make_verify_data(&self, handshake_hash: &hash::Output, label: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; 12];
        self.prf(&mut out, &self.master_secret, label, handshake_hash.as_ref());
        out
    }

    /// The `verify_data` the client's Finished must carry.
    pub fn client_verify_data(&self, handshake_hash: &hash::Output) -> Vec<u8> {
        self.make_verify_data(handshake_hash, b"client finished")
    }

    /// The `verify_data` our Finished carries.
    pub fn server_verify_data(&self, handshake_hash: &hash::Output) -> Vec<u8> {
        self.make_verify_data(handshake_hash, b"server finished")
    }

    /// The negotiated cipher suite.
    pub fn suite(&self) -> &'static Tls12CipherSuite {
        self.suite
    }

    /// The negotiated protocol version.
    pub fn version(&self) -> &'static SupportedProtocolVersion {
        self.version
    }

    pub(crate) fn randoms(&self) -> &ConnectionRandoms {
        &self.randoms
    }

    pub(crate) fn master_secret(&self) -> &[u8] {
        &self.master_secret
    }

    fn prf(&self, out: &mut [u8], secret: &[u8], label: &[u8], seed: &[u8]) {
        match self.version.prf {
            PrfKind::Md5Sha1 => prf::prf_md5_sha1(
                out,
                self.tls10.hmac_md5,
                self.tls10.hmac_sha1,
                secret,
                label,
                seed,
            ),
            PrfKind::SuiteHash => prf::prf(
                out,
                self.suite
                    .prf_provider
                    .open_key(secret)
                    .as_ref(),
                label,
                seed,
            ),
        }
    }
}

impl Drop for ConnectionSecrets {
    fn drop(&mut self) {
        self.master_secret.zeroize();
    }
}

impl fmt::Debug for ConnectionSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSecrets")
            .field("suite", &self.suite)
            .field("version", &self.version.version)
            .finish_non_exhaustive()
    }
}
