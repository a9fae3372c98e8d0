use std::collections::VecDeque;

use crate::enums::{ContentType, ProtocolVersion};
use crate::error::{Error, PeerMisbehaved};
use crate::msgs::base::Payload;
use crate::msgs::codec::{self, Codec};
use crate::msgs::handshake::HandshakeMessagePayload;
use crate::msgs::message::{Message, MessagePayload, PlainMessage};

const HEADER_SIZE: usize = 1 + 3;

/// TLS allows for handshake messages of up to 16MB.  We
/// restrict that to 64KB to limit potential for denial-of-
/// service.
const MAX_HANDSHAKE_SIZE: u32 = 0xffff;

/// This works to reconstruct TLS handshake messages
/// from individual TLS records.  It's guaranteed that
/// messages output from this layer contain precisely
/// one handshake payload.
pub struct HandshakeJoiner {
    /// Completed handshake frames for output.
    frames: VecDeque<Message>,

    /// The message payload we're currently accumulating.
    buf: Vec<u8>,
}

impl Default for HandshakeJoiner {
    fn default() -> Self {
        Self::new()
    }
}

enum BufferState {
    /// Buffer contains a header that introduces a message that is too long.
    MessageTooLarge,

    /// Buffer contains a full header and body.
    OneMessage,

    /// We need more data to see a header and complete body.
    NeedsMoreData,
}

impl HandshakeJoiner {
    /// Make a new HandshakeJoiner.
    pub fn new() -> Self {
        Self {
            frames: VecDeque::new(),
            buf: Vec::new(),
        }
    }

    /// Do we want to process this message?
    pub fn want_message(&self, msg: &PlainMessage) -> bool {
        msg.typ == ContentType::Handshake
    }

    /// Do we have any buffered data?
    ///
    /// A partially received handshake message counts.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Next complete handshake message, if any.
    pub fn pop(&mut self) -> Option<Message> {
        self.frames.pop_front()
    }

    /// Take the record, and join/split it as needed.
    ///
    /// Returns the number of complete handshake messages now queued as a
    /// result of this record.  Errors are not recoverable.
    pub fn take_message(&mut self, msg: PlainMessage) -> Result<usize, Error> {
        // The vast majority of the time `self.buf` will be empty since most
        // handshake messages arrive in a single fragment. Avoid allocating and
        // copying in that common case.
        if self.buf.is_empty() {
            self.buf = msg.payload.0;
        } else {
            self.buf
                .extend_from_slice(&msg.payload.0[..]);
        }

        let mut count = 0;
        loop {
            match self.buf_contains_message() {
                BufferState::MessageTooLarge => {
                    return Err(PeerMisbehaved::HandshakeMessageTooLarge.into());
                }
                BufferState::NeedsMoreData => break,
                BufferState::OneMessage => {
                    self.deframe_one(msg.version)?;
                    count += 1;
                }
            }
        }

        Ok(count)
    }

    /// Does our `buf` contain a full handshake payload?  It does if it is big
    /// enough to contain a header, and that header has a length which falls
    /// within `buf`.
    fn buf_contains_message(&self) -> BufferState {
        if self.buf.len() < HEADER_SIZE {
            return BufferState::NeedsMoreData;
        }

        let (header, rest) = self.buf.split_at(HEADER_SIZE);
        match codec::u24::decode(&header[1..]) {
            Some(len) if len.0 > MAX_HANDSHAKE_SIZE => BufferState::MessageTooLarge,
            Some(len) if rest.get(..len.into()).is_some() => BufferState::OneMessage,
            _ => BufferState::NeedsMoreData,
        }
    }

    /// Take a TLS handshake payload off the front of `buf`, and put it onto
    /// the back of our `frames` deque inside a normal `Message`.
    fn deframe_one(&mut self, version: ProtocolVersion) -> Result<(), Error> {
        let used = {
            let mut rd = codec::Reader::init(&self.buf);
            let parsed = HandshakeMessagePayload::read(&mut rd)?;

            let m = Message {
                version,
                payload: MessagePayload::Handshake {
                    parsed,
                    encoded: Payload::new(&self.buf[..rd.used()]),
                },
            };

            self.frames.push_back(m);
            rd.used()
        };
        self.buf = self.buf.split_off(used);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::HandshakeJoiner;
    use crate::enums::{ContentType, HandshakeType, ProtocolVersion};
    use crate::error::{Error, InvalidMessage, PeerMisbehaved};
    use crate::msgs::base::Payload;
    use crate::msgs::handshake::{HandshakeMessagePayload, HandshakePayload};
    use crate::msgs::message::{Message, MessagePayload, PlainMessage};

    fn handshake_record(bytes: &[u8]) -> PlainMessage {
        PlainMessage {
            typ: ContentType::Handshake,
            version: ProtocolVersion::TLSv1_2,
            payload: Payload::new(bytes.to_vec()),
        }
    }

    #[test]
    fn want() {
        let hj = HandshakeJoiner::new();
        assert!(hj.is_empty());

        let unwanted = PlainMessage {
            typ: ContentType::Alert,
            version: ProtocolVersion::TLSv1_2,
            payload: Payload::new(b"ponytown".to_vec()),
        };

        assert!(hj.want_message(&handshake_record(b"hello world")));
        assert!(!hj.want_message(&unwanted));
    }

    fn pop_eq(expect: &PlainMessage, hj: &mut HandshakeJoiner) {
        let got = hj.pop().unwrap();
        assert_eq!(got.payload.content_type(), expect.typ);
        assert_eq!(got.version, expect.version);

        let mut left = Vec::new();
        got.payload.encode(&mut left);
        assert_eq!(left, expect.payload.0);
    }

    #[test]
    fn split() {
        // Check we split two handshake messages within one PDU.
        let mut hj = HandshakeJoiner::new();

        // two ServerHelloDones
        let msg = handshake_record(b"\x0e\x00\x00\x00\x0e\x00\x00\x00");
        assert_eq!(hj.take_message(msg), Ok(2));
        assert!(hj.is_empty());

        let expect = Message {
            version: ProtocolVersion::TLSv1_2,
            payload: MessagePayload::handshake(HandshakeMessagePayload::new(
                HandshakePayload::ServerHelloDone,
            )),
        }
        .into();

        pop_eq(&expect, &mut hj);
        pop_eq(&expect, &mut hj);
        assert!(hj.pop().is_none());
    }

    #[test]
    fn broken() {
        // Check obvious crap payloads are reported as errors, not panics.
        let mut hj = HandshakeJoiner::new();

        // short ClientHello
        let msg = handshake_record(b"\x01\x00\x00\x02\xff\xff");
        assert!(matches!(
            hj.take_message(msg),
            Err(Error::InvalidMessage(_))
        ));
    }

    #[test]
    fn trailing_data_in_fixed_message_is_rejected() {
        let mut hj = HandshakeJoiner::new();
        let msg = handshake_record(b"\x0e\x00\x00\x01\x00");
        assert_eq!(
            hj.take_message(msg),
            Err(Error::InvalidMessage(InvalidMessage::TrailingData(
                "ServerHelloDone"
            )))
        );
    }

    #[test]
    fn join() {
        // Check we join one handshake message split over three records.
        let mut hj = HandshakeJoiner::new();
        assert!(hj.is_empty());

        // Introduce Finished of 16 bytes, providing 5.
        assert_eq!(
            hj.take_message(handshake_record(b"\x14\x00\x00\x10\x00\x01\x02\x03\x04")),
            Ok(0)
        );
        assert!(!hj.is_empty());

        // 10 more bytes.
        assert_eq!(
            hj.take_message(handshake_record(b"\x05\x06\x07\x08\x09\x0a\x0b\x0c\x0d\x0e")),
            Ok(0)
        );
        assert!(!hj.is_empty());

        // Final 1 byte.
        assert_eq!(hj.take_message(handshake_record(b"\x0f")), Ok(1));
        assert!(hj.is_empty());

        let payload = (0u8..16).collect::<Vec<_>>();
        let expect = Message {
            version: ProtocolVersion::TLSv1_2,
            payload: MessagePayload::handshake(HandshakeMessagePayload {
                typ: HandshakeType::Finished,
                payload: HandshakePayload::Finished(Payload::new(payload)),
            }),
        }
        .into();

        pop_eq(&expect, &mut hj);
    }

    #[test]
    fn test_rejects_giant_messages() {
        let mut hj = HandshakeJoiner::new();
        let msg = handshake_record(b"\x0b\x01\x00\x04\x01\x00\x01\x00\xff\xfe");
        assert_eq!(
            hj.take_message(msg),
            Err(PeerMisbehaved::HandshakeMessageTooLarge.into())
        );
        assert!(!hj.is_empty());
    }
}
