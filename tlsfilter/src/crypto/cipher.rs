use crate::enums::{ContentType, ProtocolVersion};
use crate::error::Error;
use crate::msgs::codec;
pub use crate::msgs::message::{BorrowedPlainMessage, OpaqueMessage, PlainMessage};

/// A block cipher in CBC mode, without padding.
///
/// The record layer does its own TLS padding, so every buffer given to
/// `encrypt` and `decrypt` is a whole number of blocks.
pub trait CbcMode: Send + Sync {
    /// The length of key in bytes.
    fn key_len(&self) -> usize;

    /// The block length in bytes.  This is also the IV length.
    fn block_len(&self) -> usize;

    /// Encrypt `buf` in place under `key`, chaining from `iv`.
    fn encrypt(&self, key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<(), Error>;

    /// Decrypt `buf` in place under `key`, chaining from `iv`.
    fn decrypt(&self, key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<(), Error>;
}

/// Objects with this trait can decrypt TLS messages.
///
/// They may carry state between records (the TLS 1.0 IV chain), hence `&mut self`.
pub trait MessageDecrypter: Send + Sync {
    /// Perform the decryption over the concerned TLS message.
    fn decrypt(&mut self, m: OpaqueMessage, seq: u64) -> Result<PlainMessage, Error>;
}

/// Objects with this trait can encrypt TLS messages.
pub trait MessageEncrypter: Send + Sync {
    /// Encrypt the message `m`.
    fn encrypt(&mut self, m: BorrowedPlainMessage<'_>, seq: u64) -> Result<OpaqueMessage, Error>;
}

impl dyn MessageEncrypter {
    pub(crate) fn invalid() -> Box<dyn MessageEncrypter> {
        Box::new(InvalidMessageEncrypter {})
    }
}

impl dyn MessageDecrypter {
    pub(crate) fn invalid() -> Box<dyn MessageDecrypter> {
        Box::new(InvalidMessageDecrypter {})
    }
}

/// The header covered by a TLS 1.0-1.2 record MAC.
///
/// `seq_num(8) || type(1) || version(2) || length(2)`.
pub fn make_tls12_mac_header(
    seq: u64,
    typ: ContentType,
    vers: ProtocolVersion,
    len: usize,
) -> [u8; TLS12_MAC_HEADER_LEN] {
    let mut out = [0; TLS12_MAC_HEADER_LEN];
    codec::put_u64(seq, &mut out[0..]);
    out[8] = u8::from(typ);
    codec::put_u16(vers.get_u16(), &mut out[9..]);
    codec::put_u16(len as u16, &mut out[11..]);
    out
}

const TLS12_MAC_HEADER_LEN: usize = 8 + 1 + 2 + 2;

/// A `MessageEncrypter` which doesn't work.
struct InvalidMessageEncrypter {}

impl MessageEncrypter for InvalidMessageEncrypter {
    fn encrypt(&mut self, _m: BorrowedPlainMessage<'_>, _seq: u64) -> Result<OpaqueMessage, Error> {
        Err(Error::EncryptError)
    }
}

/// A `MessageDecrypter` which doesn't work.
struct InvalidMessageDecrypter {}

impl MessageDecrypter for InvalidMessageDecrypter {
    fn decrypt(&mut self, _m: OpaqueMessage, _seq: u64) -> Result<PlainMessage, Error> {
        Err(Error::DecryptError)
    }
}
