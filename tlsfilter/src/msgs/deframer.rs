use std::io;

use crate::error::{Error, InvalidMessage};
use crate::msgs::codec;
use crate::msgs::message::{MessageError, OpaqueMessage, MAX_WIRE_SIZE};

/// This deframer works to reconstruct TLS records
/// from arbitrary-sized reads, buffering as necessary.
/// The input is `read()`, the output is `pop()`.
pub struct MessageDeframer {
    /// Set if the peer is not talking TLS, but some other
    /// protocol.  The caller should abort the connection, because
    /// the deframer cannot recover.
    last_error: Option<Error>,

    /// A fixed-size buffer containing the currently-accumulating
    /// TLS records.
    buf: Box<[u8; MAX_WIRE_SIZE]>,

    /// What size prefix of `buf` is used.
    used: usize,
}

impl Default for MessageDeframer {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageDeframer {
    pub fn new() -> Self {
        Self {
            last_error: None,
            buf: Box::new([0u8; MAX_WIRE_SIZE]),
            used: 0,
        }
    }

    /// Return any complete record that the deframer has been able to
    /// parse.
    ///
    /// Returns an `Error` if the deframer failed to parse some record
    /// contents, `Ok(None)` if no full record is buffered, and
    /// `Ok(Some(_))` if a valid record was found.
    pub fn pop(&mut self) -> Result<Option<OpaqueMessage>, Error> {
        if let Some(last_err) = &self.last_error {
            return Err(last_err.clone());
        }

        let mut rd = codec::Reader::init(&self.buf[..self.used]);
        let m = match OpaqueMessage::read(&mut rd) {
            Ok(m) => m,
            Err(MessageError::TooShortForHeader | MessageError::TooShortForLength) => {
                return Ok(None);
            }
            Err(err) => {
                let err = match err {
                    MessageError::MessageTooLarge => Error::PeerSentOversizedRecord,
                    MessageError::InvalidContentType => {
                        InvalidMessage::InvalidContentType.into()
                    }
                    MessageError::UnknownProtocolVersion => {
                        InvalidMessage::UnknownProtocolVersion.into()
                    }
                    MessageError::InvalidEmptyPayload => {
                        InvalidMessage::InvalidEmptyPayload.into()
                    }
                    MessageError::TooShortForHeader | MessageError::TooShortForLength => {
                        unreachable!()
                    }
                };
                self.last_error = Some(err.clone());
                return Err(err);
            }
        };

        let used = rd.used();
        self.buf_consume(used);
        Ok(Some(m))
    }

    /// Read some bytes from `rd`, and add them to our internal buffer.
    pub fn read(&mut self, rd: &mut dyn io::Read) -> io::Result<usize> {
        if self.used == MAX_WIRE_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "message buffer full",
            ));
        }

        // Try to do the largest reads possible.
        debug_assert!(self.used <= MAX_WIRE_SIZE);
        let new_bytes = rd.read(&mut self.buf[self.used..])?;
        self.used += new_bytes;
        Ok(new_bytes)
    }

    /// Returns true if we have a partial record buffered.
    pub fn has_pending(&self) -> bool {
        self.used > 0
    }

    fn buf_consume(&mut self, taken: usize) {
        if taken < self.used {
            /* Before:
             * +----------+----------+----------+
             * | taken    | pending  |xxxxxxxxxx|
             * +----------+----------+----------+
             * 0          ^ taken    ^ self.used
             *
             * After:
             * +----------+----------+----------+
             * | pending  |xxxxxxxxxxxxxxxxxxxxx|
             * +----------+----------+----------+
             * 0          ^ self.used
             */

            self.buf
                .copy_within(taken..self.used, 0);
            self.used -= taken;
        } else {
            self.used = 0;
        }
    }
}
