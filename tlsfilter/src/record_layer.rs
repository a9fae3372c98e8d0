use crate::crypto::cipher::{MessageDecrypter, MessageEncrypter};
use crate::error::Error;
use crate::msgs::message::{BorrowedPlainMessage, OpaqueMessage, PlainMessage};

#[cfg(feature = "logging")]
use crate::log::trace;

static SEQ_SOFT_LIMIT: u64 = 0xffff_ffff_ffff_0000u64;
static SEQ_HARD_LIMIT: u64 = 0xffff_ffff_ffff_fffeu64;

#[derive(Clone, Copy, Debug, PartialEq)]
enum DirectionState {
    /// No keying material.
    Invalid,

    /// Keying material present, but not yet in use.
    Prepared,

    /// Keying material in use.
    Active,
}

/// Record layer that tracks decryption and encryption keys.
///
/// Each direction starts out in plaintext.  Keys for a direction are
/// prepared once the key block is known and only switched on at that
/// direction's ChangeCipherSpec; both sequence numbers restart from zero
/// at that point.
pub struct RecordLayer {
    message_encrypter: Box<dyn MessageEncrypter>,
    message_decrypter: Box<dyn MessageDecrypter>,
    write_seq: u64,
    read_seq: u64,
    encrypt_state: DirectionState,
    decrypt_state: DirectionState,
}

impl RecordLayer {
    /// Create new record layer with no keys.
    pub fn new() -> Self {
        Self {
            message_encrypter: <dyn MessageEncrypter>::invalid(),
            message_decrypter: <dyn MessageDecrypter>::invalid(),
            write_seq: 0,
            read_seq: 0,
            encrypt_state: DirectionState::Invalid,
            decrypt_state: DirectionState::Invalid,
        }
    }

    /// Decrypt a TLS message.
    ///
    /// `encr` is a decoded message allegedly received from the peer.
    /// If it can be decrypted, its decryption is returned.  Otherwise,
    /// an error is returned.
    ///
    /// The read sequence number advances for every record, protected or not.
    pub fn decrypt_incoming(&mut self, encr: OpaqueMessage) -> Result<PlainMessage, Error> {
        if self.decrypt_state != DirectionState::Active {
            self.read_seq = self.read_seq.wrapping_add(1);
            return Ok(encr.into_plain_message());
        }

        if self.read_seq >= SEQ_HARD_LIMIT {
            return Err(Error::DecryptError);
        }

        let seq = self.read_seq;
        self.read_seq += 1;
        trace!("decrypting {:?} record seq={}", encr.typ, seq);
        self.message_decrypter.decrypt(encr, seq)
    }

    /// Encrypt a TLS message.
    ///
    /// `plain` is a TLS message we'd like to send.  Before this direction's
    /// ChangeCipherSpec it is framed as is.
    pub fn encrypt_outgoing(
        &mut self,
        plain: BorrowedPlainMessage<'_>,
    ) -> Result<OpaqueMessage, Error> {
        if self.encrypt_state != DirectionState::Active {
            self.write_seq = self.write_seq.wrapping_add(1);
            return Ok(plain.to_unencrypted_opaque());
        }

        if self.encrypt_exhausted() {
            return Err(Error::EncryptError);
        }

        let seq = self.write_seq;
        self.write_seq += 1;
        self.message_encrypter.encrypt(plain, seq)
    }

    /// Prepare to use the given `MessageEncrypter` for future message encryption.
    /// It is not used until you call `start_encrypting`.
    pub fn prepare_message_encrypter(&mut self, cipher: Box<dyn MessageEncrypter>) {
        self.message_encrypter = cipher;
        self.encrypt_state = DirectionState::Prepared;
    }

    /// Prepare to use the given `MessageDecrypter` for future message decryption.
    /// It is not used until you call `start_decrypting`.
    pub fn prepare_message_decrypter(&mut self, cipher: Box<dyn MessageDecrypter>) {
        self.message_decrypter = cipher;
        self.decrypt_state = DirectionState::Prepared;
    }

    /// Start using the `MessageEncrypter` previously provided to the previous
    /// call to `prepare_message_encrypter`, from sequence number zero.
    pub fn start_encrypting(&mut self) {
        debug_assert!(self.encrypt_state == DirectionState::Prepared);
        self.encrypt_state = DirectionState::Active;
        self.write_seq = 0;
    }

    /// Start using the `MessageDecrypter` previously provided to the previous
    /// call to `prepare_message_decrypter`, from sequence number zero.
    pub fn start_decrypting(&mut self) {
        debug_assert!(self.decrypt_state == DirectionState::Prepared);
        self.decrypt_state = DirectionState::Active;
        self.read_seq = 0;
    }

    /// Return true if we are getting close to encrypting too many
    /// messages with our encryption key.
    pub fn wants_close_before_encrypt(&self) -> bool {
        self.encrypt_state == DirectionState::Active && self.write_seq == SEQ_SOFT_LIMIT
    }

    /// Return true if we outright refuse to do anything with the
    /// encryption key.
    pub fn encrypt_exhausted(&self) -> bool {
        self.encrypt_state == DirectionState::Active && self.write_seq >= SEQ_HARD_LIMIT
    }

    /// Whether outgoing records are protected.
    pub fn is_encrypting(&self) -> bool {
        self.encrypt_state == DirectionState::Active
    }

    /// Whether incoming records are expected to be protected.
    pub fn is_decrypting(&self) -> bool {
        self.decrypt_state == DirectionState::Active
    }

    /// Sequence number of the next record we send.
    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    /// Sequence number of the next record we receive.
    pub fn read_seq(&self) -> u64 {
        self.read_seq
    }

    #[cfg(test)]
    fn set_write_seq(&mut self, seq: u64) {
        self.write_seq = seq;
    }
}

impl Default for RecordLayer {
    fn default() -> Self {
        Self::new()
    }
}
