use crate::enums::{ContentType, ProtocolVersion};
use crate::error::Error;
use crate::msgs::message::{BorrowedPlainMessage, PlainMessage, MAX_FRAGMENT_LEN};

/// Default plaintext fragment length for records we send.
pub(crate) const DEFAULT_FRAGMENT_LEN: usize = 16384;
pub(crate) const PACKET_OVERHEAD: usize = 1 + 2 + 2;
pub(crate) const MAX_FRAGMENT_SIZE: usize = MAX_FRAGMENT_LEN + PACKET_OVERHEAD;

pub struct MessageFragmenter {
    max_frag: usize,
}

impl Default for MessageFragmenter {
    fn default() -> Self {
        Self {
            max_frag: DEFAULT_FRAGMENT_LEN,
        }
    }
}

impl MessageFragmenter {
    /// Take the Message `msg` and re-fragment it into new
    /// messages whose fragment is no more than max_frag.
    /// Return an iterator across those messages.
    /// Payloads are borrowed.
    pub fn fragment_message<'a>(
        &self,
        msg: &'a PlainMessage,
    ) -> impl Iterator<Item = BorrowedPlainMessage<'a>> + 'a {
        self.fragment_slice(msg.typ, msg.version, &msg.payload.0)
    }

    /// Enqueue borrowed fragments of (version, typ, payload) which
    /// are no longer than max_frag onto the `out` deque.
    ///
    /// An empty payload yields no fragments.
    pub(crate) fn fragment_slice<'a>(
        &self,
        typ: ContentType,
        version: ProtocolVersion,
        payload: &'a [u8],
    ) -> impl Iterator<Item = BorrowedPlainMessage<'a>> + 'a {
        payload
            .chunks(self.max_frag)
            .map(move |c| BorrowedPlainMessage {
                typ,
                version,
                payload: c,
            })
    }

    /// Set the maximum fragment size that will be produced.
    ///
    /// This includes overhead. A `max_fragment_size` of 10 will produce TLS fragments
    /// up to 10 bytes long.
    ///
    /// A `max_fragment_size` of `None` restores the default of 16384 payload bytes.
    ///
    /// Returns BadMaxFragmentSize if the size is smaller than 32 or larger than 32773.
    pub fn set_max_fragment_size(&mut self, max_fragment_size: Option<usize>) -> Result<(), Error> {
        self.max_frag = match max_fragment_size {
            Some(sz @ 32..=MAX_FRAGMENT_SIZE) => sz - PACKET_OVERHEAD,
            None => DEFAULT_FRAGMENT_LEN,
            _ => return Err(Error::BadMaxFragmentSize),
        };
        Ok(())
    }

    pub fn max_fragment_len(&self) -> usize {
        self.max_frag
    }
}

#[cfg(test)]
mod tests {
    use super::{MessageFragmenter, DEFAULT_FRAGMENT_LEN, MAX_FRAGMENT_SIZE, PACKET_OVERHEAD};
    use crate::enums::{ContentType, ProtocolVersion};
    use crate::error::Error;
    use crate::msgs::base::Payload;
    use crate::msgs::message::{BorrowedPlainMessage, PlainMessage};

    fn msg_eq(
        m: &BorrowedPlainMessage<'_>,
        total_len: usize,
        typ: &ContentType,
        version: &ProtocolVersion,
        bytes: &[u8],
    ) {
        assert_eq!(&m.typ, typ);
        assert_eq!(&m.version, version);
        assert_eq!(m.payload, bytes);

        let buf = m.to_unencrypted_opaque().encode();

        assert_eq!(total_len, buf.len());
    }

    #[test]
    fn smoke() {
        let typ = ContentType::Handshake;
        let version = ProtocolVersion::TLSv1_2;
        let data: Vec<u8> = (1..70u8).collect();
        let m = PlainMessage {
            typ,
            version,
            payload: Payload::new(data),
        };

        let mut frag = MessageFragmenter::default();
        frag.set_max_fragment_size(Some(32))
            .unwrap();
        let q = frag
            .fragment_message(&m)
            .collect::<Vec<_>>();
        assert_eq!(q.len(), 3);
        msg_eq(&q[0], 32, &typ, &version, &(1..28u8).collect::<Vec<_>>());
        msg_eq(&q[1], 32, &typ, &version, &(28..55u8).collect::<Vec<_>>());
        msg_eq(&q[2], 20, &typ, &version, &(55..70u8).collect::<Vec<_>>());
    }

    #[test]
    fn non_fragment() {
        let m = PlainMessage {
            typ: ContentType::ApplicationData,
            version: ProtocolVersion::TLSv1_0,
            payload: Payload::new(b"\x01\x02\x03\x04\x05\x06\x07\x08".to_vec()),
        };

        let frag = MessageFragmenter::default();
        let q = frag
            .fragment_message(&m)
            .collect::<Vec<_>>();
        assert_eq!(q.len(), 1);
        msg_eq(
            &q[0],
            PACKET_OVERHEAD + 8,
            &ContentType::ApplicationData,
            &ProtocolVersion::TLSv1_0,
            b"\x01\x02\x03\x04\x05\x06\x07\x08",
        );
    }

    #[test]
    fn default_splits_at_16k() {
        let m = PlainMessage {
            typ: ContentType::ApplicationData,
            version: ProtocolVersion::TLSv1_2,
            payload: Payload::new(vec![0u8; DEFAULT_FRAGMENT_LEN * 2 + 1]),
        };
        let frag = MessageFragmenter::default();
        let lens = frag
            .fragment_message(&m)
            .map(|m| m.payload.len())
            .collect::<Vec<_>>();
        assert_eq!(lens, vec![DEFAULT_FRAGMENT_LEN, DEFAULT_FRAGMENT_LEN, 1]);
    }

    #[test]
    fn empty_payload_yields_nothing() {
        let frag = MessageFragmenter::default();
        assert_eq!(
            frag.fragment_slice(ContentType::ApplicationData, ProtocolVersion::TLSv1_2, &[])
                .count(),
            0
        );
    }

    #[test]
    fn fragment_size_limits() {
        let mut frag = MessageFragmenter::default();
        assert_eq!(
            frag.set_max_fragment_size(Some(31)),
            Err(Error::BadMaxFragmentSize)
        );
        assert_eq!(
            frag.set_max_fragment_size(Some(MAX_FRAGMENT_SIZE + 1)),
            Err(Error::BadMaxFragmentSize)
        );
        frag.set_max_fragment_size(Some(MAX_FRAGMENT_SIZE))
            .unwrap();
        assert_eq!(frag.max_fragment_len(), 32768);
        frag.set_max_fragment_size(None).unwrap();
        assert_eq!(frag.max_fragment_len(), DEFAULT_FRAGMENT_LEN);
    }
}
