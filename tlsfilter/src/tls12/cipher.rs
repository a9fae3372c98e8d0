use subtle::{Choice, ConstantTimeEq};
use zeroize::Zeroizing;

use crate::crypto::cipher::{
    make_tls12_mac_header, CbcMode, MessageDecrypter, MessageEncrypter,
};
use crate::crypto::{hmac, SecureRandom};
use crate::error::Error;
use crate::msgs::base::Payload;
use crate::msgs::message::{BorrowedPlainMessage, OpaqueMessage, PlainMessage, MAX_FRAGMENT_LEN};
use crate::suites::Tls12CipherSuite;
use crate::versions::IvMode;

/// Where the next record's IV comes from.
enum IvState {
    /// The last ciphertext block of the previous record.
    Chained(Zeroizing<Vec<u8>>),
    /// Carried in clear at the front of each record.
    Explicit,
}

impl IvState {
    fn new(mode: IvMode, initial: &[u8]) -> Self {
        match mode {
            IvMode::Chained => Self::Chained(Zeroizing::new(initial.to_vec())),
            IvMode::Explicit => Self::Explicit,
        }
    }
}

/// MAC-then-encrypt record protection for the CBC cipher suites.
pub(crate) struct CbcMessageEncrypter {
    bulk: &'static dyn CbcMode,
    key: Zeroizing<Vec<u8>>,
    mac_key: Box<dyn hmac::Key>,
    iv: IvState,
    secure_random: &'static dyn SecureRandom,
}

impl CbcMessageEncrypter {
    pub(crate) fn new(
        suite: &Tls12CipherSuite,
        iv_mode: IvMode,
        key: &[u8],
        mac_key: &[u8],
        iv: &[u8],
        secure_random: &'static dyn SecureRandom,
    ) -> Self {
        Self {
            bulk: suite.bulk,
            key: Zeroizing::new(key.to_vec()),
            mac_key: suite.mac.open_key(mac_key),
            iv: IvState::new(iv_mode, iv),
            secure_random,
        }
    }
}

impl MessageEncrypter for CbcMessageEncrypter {
    fn encrypt(&mut self, msg: BorrowedPlainMessage<'_>, seq: u64) -> Result<OpaqueMessage, Error> {
        let block_len = self.bulk.block_len();
        let mac = self.mac_key.sign_concat(
            &make_tls12_mac_header(seq, msg.typ, msg.version, msg.payload.len()),
            &[],
            msg.payload,
        );

        let explicit_iv_len = match self.iv {
            IvState::Chained(_) => 0,
            IvState::Explicit => block_len,
        };

        // payload || mac || padding || padding_length, a whole number of blocks.
        let unpadded = msg.payload.len() + mac.as_ref().len() + 1;
        let padding = (block_len - unpadded % block_len) % block_len;
        let total = explicit_iv_len + unpadded + padding;

        let mut buf = Vec::with_capacity(total);
        buf.resize(explicit_iv_len, 0);
        self.secure_random
            .fill(&mut buf[..explicit_iv_len])?;
        buf.extend_from_slice(msg.payload);
        buf.extend_from_slice(mac.as_ref());
        buf.resize(total, padding as u8);

        match &mut self.iv {
            IvState::Explicit => {
                let (iv, body) = buf.split_at_mut(explicit_iv_len);
                self.bulk
                    .encrypt(&self.key, iv, body)?;
            }
            IvState::Chained(iv) => {
                self.bulk
                    .encrypt(&self.key, iv, &mut buf)?;
                iv.copy_from_slice(&buf[total - block_len..]);
            }
        }

        Ok(OpaqueMessage {
            typ: msg.typ,
            version: msg.version,
            payload: Payload::new(buf),
        })
    }
}

/// The reverse of [`CbcMessageEncrypter`].
///
/// Padding is checked before the MAC, and both checks always run.  Either
/// failure surfaces as the same [`Error::DecryptError`].  The MAC still
/// covers a length chosen by the padding byte, so its timing varies with
/// the padding (the "Lucky Thirteen" class of attack).
pub(crate) struct CbcMessageDecrypter {
    bulk: &'static dyn CbcMode,
    key: Zeroizing<Vec<u8>>,
    mac_key: Box<dyn hmac::Key>,
    iv: IvState,
}

impl CbcMessageDecrypter {
    pub(crate) fn new(
        suite: &Tls12CipherSuite,
        iv_mode: IvMode,
        key: &[u8],
        mac_key: &[u8],
        iv: &[u8],
    ) -> Self {
        Self {
            bulk: suite.bulk,
            key: Zeroizing::new(key.to_vec()),
            mac_key: suite.mac.open_key(mac_key),
            iv: IvState::new(iv_mode, iv),
        }
    }
}

impl MessageDecrypter for CbcMessageDecrypter {
    fn decrypt(&mut self, mut msg: OpaqueMessage, seq: u64) -> Result<PlainMessage, Error> {
        let block_len = self.bulk.block_len();
        let mac_len = self.mac_key.tag_len();
        let explicit_iv_len = match self.iv {
            IvState::Chained(_) => 0,
            IvState::Explicit => block_len,
        };

        let payload = &mut msg.payload.0;
        if payload.len() < explicit_iv_len
            || (payload.len() - explicit_iv_len) % block_len != 0
            || payload.len() - explicit_iv_len < mac_len + 1
        {
            return Err(Error::DecryptError);
        }

        match &mut self.iv {
            IvState::Explicit => {
                let (iv, body) = payload.split_at_mut(explicit_iv_len);
                self.bulk
                    .decrypt(&self.key, iv, body)?;
                payload.drain(..explicit_iv_len);
            }
            IvState::Chained(iv) => {
                let next_iv = payload[payload.len() - block_len..].to_vec();
                self.bulk
                    .decrypt(&self.key, iv, payload)?;
                iv.copy_from_slice(&next_iv);
            }
        }

        // The padding and MAC checks both run to completion and fold into
        // one verdict. A padding length that cannot fit is treated as zero.
        let len = payload.len();
        let claimed = payload[len - 1] as usize;
        let fits = claimed + 1 + mac_len <= len;
        let padding = if fits { claimed } else { 0 };

        let bad_padding = payload[len - 1 - padding..len - 1]
            .iter()
            .fold(0u8, |acc, b| acc | (b ^ claimed as u8));
        let padding_ok = Choice::from(fits as u8) & bad_padding.ct_eq(&0);

        let plain_len = len - 1 - padding - mac_len;
        let expected = self.mac_key.sign_concat(
            &make_tls12_mac_header(seq, msg.typ, msg.version, plain_len),
            &[],
            &payload[..plain_len],
        );
        let mac_ok = expected
            .as_ref()
            .ct_eq(&payload[plain_len..plain_len + mac_len]);

        if !bool::from(padding_ok & mac_ok) {
            return Err(Error::DecryptError);
        }

        if plain_len > MAX_FRAGMENT_LEN {
            return Err(Error::PeerSentOversizedRecord);
        }

        payload.truncate(plain_len);
        Ok(msg.into_plain_message())
    }
}
