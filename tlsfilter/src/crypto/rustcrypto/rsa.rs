use core::fmt;
use std::sync::Arc;

use ::rsa::pkcs1::DecodeRsaPrivateKey;
use ::rsa::pkcs8::DecodePrivateKey;
use ::rsa::traits::PublicKeyParts;
use ::rsa::{Pkcs1v15Encrypt, RsaPrivateKey};
use pki_types::PrivateKeyDer;
use rand_core::OsRng;

use crate::crypto::DecryptingKey;
use crate::error::Error;

/// An RSA private key held in memory.
pub struct RsaDecryptingKey(RsaPrivateKey);

impl RsaDecryptingKey {
    /// Parse a PKCS#1 or PKCS#8 encoded RSA private key.
    pub fn new(der: &PrivateKeyDer<'_>) -> Result<Self, Error> {
        let key = match der {
            PrivateKeyDer::Pkcs1(der) => RsaPrivateKey::from_pkcs1_der(der.secret_pkcs1_der())
                .map_err(|e| Error::General(format!("failed to parse RSA key: {e}")))?,
            PrivateKeyDer::Pkcs8(der) => RsaPrivateKey::from_pkcs8_der(der.secret_pkcs8_der())
                .map_err(|e| Error::General(format!("failed to parse RSA key: {e}")))?,
            _ => {
                return Err(Error::General(
                    "only RSA private keys are supported".into(),
                ))
            }
        };
        Ok(Self(key))
    }

    pub(crate) fn load(der: PrivateKeyDer<'static>) -> Result<Arc<dyn DecryptingKey>, Error> {
        Ok(Arc::new(Self::new(&der)?))
    }
}

impl DecryptingKey for RsaDecryptingKey {
    fn decrypt_pkcs1(&self, ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        self.0
            .decrypt_blinded(&mut OsRng, Pkcs1v15Encrypt, ciphertext)
            .map_err(|_| Error::General("RSA decryption failed".into()))
    }

    fn modulus_len(&self) -> usize {
        self.0.size()
    }
}

impl fmt::Debug for RsaDecryptingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaDecryptingKey")
            .field("modulus_len", &self.modulus_len())
            .finish()
    }
}
