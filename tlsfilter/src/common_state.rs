use crate::enums::{AlertDescription, ContentType, ProtocolVersion};
use crate::error::Error;
#[cfg(feature = "logging")]
use crate::log::{debug, trace, warn};
use crate::msgs::alert::AlertMessagePayload;
use crate::msgs::base::Payload;
use crate::msgs::enums::AlertLevel;
use crate::msgs::fragmenter::MessageFragmenter;
use crate::msgs::message::{Message, OpaqueMessage, PlainMessage};
use crate::record_layer::RecordLayer;
use crate::suites::Tls12CipherSuite;
use crate::vecbuf::ChunkVecBuffer;
use crate::versions::SupportedProtocolVersion;

/// Which end of the connection some key material belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    /// A client initiates the connection.
    Client,
    /// A server waits for a client to connect.
    Server,
}

/// Connection state shared by the handshake and the application-data
/// paths: record protection, outgoing records and received plaintext.
pub(crate) struct CommonState {
    pub(crate) negotiated_version: Option<&'static SupportedProtocolVersion>,
    pub(crate) suite: Option<&'static Tls12CipherSuite>,
    pub(crate) record_layer: RecordLayer,
    pub(crate) message_fragmenter: MessageFragmenter,
    pub(crate) received_plaintext: ChunkVecBuffer,
    pub(crate) sendable_tls: ChunkVecBuffer,
    pub(crate) may_send_application_data: bool,
    pub(crate) may_receive_application_data: bool,
    pub(crate) has_received_close_notify: bool,
    pub(crate) has_sent_close_notify: bool,
    pub(crate) has_seen_eof: bool,
    sent_fatal_alert: bool,
}

impl CommonState {
    pub(crate) fn new() -> Self {
        Self {
            negotiated_version: None,
            suite: None,
            record_layer: RecordLayer::new(),
            message_fragmenter: MessageFragmenter::default(),
            received_plaintext: ChunkVecBuffer::new(),
            sendable_tls: ChunkVecBuffer::new(),
            may_send_application_data: false,
            may_receive_application_data: false,
            has_received_close_notify: false,
            has_sent_close_notify: false,
            has_seen_eof: false,
            sent_fatal_alert: false,
        }
    }

    /// The version stamped on records we send: TLS 1.0 until a version
    /// has been negotiated.
    pub(crate) fn record_version(&self) -> ProtocolVersion {
        self.negotiated_version
            .map(|v| v.version)
            .unwrap_or(ProtocolVersion::TLSv1_0)
    }

    /// Fragment, protect and queue `m` for sending.
    pub(crate) fn send_msg(&mut self, m: Message) -> Result<(), Error> {
        trace!("sending {:?}", m);
        let plain = PlainMessage {
            version: self.record_version(),
            ..PlainMessage::from(m)
        };

        let fragments = self
            .message_fragmenter
            .fragment_message(&plain)
            .collect::<Vec<_>>();
        for fragment in fragments {
            let em = self
                .record_layer
                .encrypt_outgoing(fragment)?;
            self.queue_tls_message(em);
        }
        Ok(())
    }

    /// Send `data` as application data records.  Returns how many bytes
    /// were accepted, which is all of them unless the connection closes
    /// itself because its write sequence is running out.
    pub(crate) fn send_appdata(&mut self, data: &[u8]) -> Result<usize, Error> {
        if self.has_sent_close_notify {
            return Err(Error::ConnectionClosed);
        }
        if !self.may_send_application_data {
            return Err(Error::HandshakeNotComplete);
        }

        let fragments = self
            .message_fragmenter
            .fragment_slice(ContentType::ApplicationData, self.record_version(), data)
            .collect::<Vec<_>>();

        let mut sent = 0;
        for fragment in fragments {
            if self.record_layer.wants_close_before_encrypt() {
                warn!("write sequence nearly exhausted, closing connection");
                self.send_close_notify();
                return Ok(sent);
            }

            let len = fragment.payload.len();
            let em = self
                .record_layer
                .encrypt_outgoing(fragment)?;
            self.queue_tls_message(em);
            sent += len;
        }

        Ok(sent)
    }

    fn queue_tls_message(&mut self, m: OpaqueMessage) {
        self.sendable_tls.append(m.encode());
    }

    fn send_alert(&mut self, level: AlertLevel, desc: AlertDescription) -> Result<(), Error> {
        let alert = PlainMessage {
            version: self.record_version(),
            ..PlainMessage::from(Message::build_alert(level, desc))
        };
        let em = self
            .record_layer
            .encrypt_outgoing(alert.borrow())?;
        self.queue_tls_message(em);
        Ok(())
    }

    pub(crate) fn send_warning_alert(&mut self, desc: AlertDescription) {
        warn!("Sending warning alert {:?}", desc);
        // a warning we cannot protect is not worth failing for
        let _ = self.send_alert(AlertLevel::Warning, desc);
    }

    /// Send a fatal alert, once.
    pub(crate) fn send_fatal_alert(&mut self, desc: AlertDescription) {
        if self.sent_fatal_alert {
            return;
        }
        warn!("Sending fatal alert {:?}", desc);
        self.sent_fatal_alert = true;
        let _ = self.send_alert(AlertLevel::Fatal, desc);
    }

    /// Send the fatal alert `err` corresponds to, if any.
    pub(crate) fn maybe_send_fatal_alert(&mut self, err: &Error) {
        if let Some(desc) = err.alert() {
            self.send_fatal_alert(desc);
        }
    }

    /// Queues a close_notify warning alert to be sent in the next
    /// [`crate::ServerConnection::write_tls`] call.  Later calls do nothing.
    pub(crate) fn send_close_notify(&mut self) {
        if self.has_sent_close_notify {
            return;
        }
        debug!("Sending warning alert {:?}", AlertDescription::CloseNotify);
        self.has_sent_close_notify = true;
        let _ = self.send_alert(AlertLevel::Warning, AlertDescription::CloseNotify);
    }

    /// Process an alert from the peer.
    ///
    /// Any fatal alert becomes [`Error::AlertReceived`], close_notify
    /// included.  A warning close_notify marks the end of the stream; other
    /// warnings are logged and ignored.
    pub(crate) fn process_alert(&mut self, alert: &AlertMessagePayload) -> Result<(), Error> {
        if alert.level != AlertLevel::Warning {
            warn!("TLS alert received: {:?}", alert);
            return Err(Error::AlertReceived(alert.description));
        }

        if alert.description == AlertDescription::CloseNotify {
            debug!("peer sent close_notify");
            self.has_received_close_notify = true;
            return Ok(());
        }

        warn!("TLS alert warning received: {:?}", alert);
        Ok(())
    }

    /// Queue decrypted application data for the reader.
    pub(crate) fn take_received_plaintext(&mut self, bytes: Payload) {
        self.received_plaintext.append(bytes.0);
    }

    pub(crate) fn wants_write(&self) -> bool {
        !self.sendable_tls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msgs::codec::Codec;
    use crate::versions::TLS11;

    fn drain(cs: &mut CommonState) -> Vec<u8> {
        let mut out = Vec::new();
        while cs.wants_write() {
            cs.sendable_tls.write_to(&mut out).unwrap();
        }
        out
    }

    #[test]
    fn appdata_refused_before_handshake() {
        let mut cs = CommonState::new();
        assert_eq!(cs.send_appdata(b"x"), Err(Error::HandshakeNotComplete));
        cs.may_send_application_data = true;
        assert_eq!(cs.send_appdata(b"hello"), Ok(5));
        let wire = drain(&mut cs);
        assert_eq!(wire, b"\x17\x03\x01\x00\x05hello");
    }

    #[test]
    fn records_carry_negotiated_version() {
        let mut cs = CommonState::new();
        cs.negotiated_version = Some(&TLS11);
        cs.may_send_application_data = true;
        cs.send_appdata(b"hi").unwrap();
        assert_eq!(&drain(&mut cs)[..3], b"\x17\x03\x02");
    }

    #[test]
    fn large_writes_are_fragmented() {
        let mut cs = CommonState::new();
        cs.may_send_application_data = true;
        assert_eq!(cs.send_appdata(&[0u8; 40000]), Ok(40000));
        let wire = drain(&mut cs);
        // 16384 + 16384 + 7232, each with a 5 byte header
        assert_eq!(wire.len(), 40000 + 3 * 5);
        assert_eq!(&wire[..5], b"\x17\x03\x01\x40\x00");
    }

    #[test]
    fn close_notify_is_sent_once() {
        let mut cs = CommonState::new();
        cs.send_close_notify();
        cs.send_close_notify();
        assert_eq!(drain(&mut cs), b"\x15\x03\x01\x00\x02\x01\x00");
        assert_eq!(cs.send_appdata(b"x"), Err(Error::ConnectionClosed));
    }

    #[test]
    fn fatal_alert_is_sent_once() {
        let mut cs = CommonState::new();
        cs.maybe_send_fatal_alert(&Error::DecryptError);
        cs.maybe_send_fatal_alert(&Error::FinishedMismatch);
        assert_eq!(drain(&mut cs), b"\x15\x03\x01\x00\x02\x02\x14");
    }

    #[test]
    fn no_alert_for_received_alert() {
        let mut cs = CommonState::new();
        cs.maybe_send_fatal_alert(&Error::AlertReceived(AlertDescription::HandshakeFailure));
        assert!(!cs.wants_write());
    }

    #[test]
    fn alert_processing() {
        let mut cs = CommonState::new();
        let warning = AlertMessagePayload {
            level: AlertLevel::Warning,
            description: AlertDescription::UserCanceled,
        };
        assert_eq!(cs.process_alert(&warning), Ok(()));
        assert!(!cs.has_received_close_notify);

        let fatal = AlertMessagePayload {
            level: AlertLevel::Fatal,
            description: AlertDescription::HandshakeFailure,
        };
        assert_eq!(
            cs.process_alert(&fatal),
            Err(Error::AlertReceived(AlertDescription::HandshakeFailure))
        );

        let fatal_close = AlertMessagePayload::read_bytes(&[2, 0]).unwrap();
        assert_eq!(
            cs.process_alert(&fatal_close),
            Err(Error::AlertReceived(AlertDescription::CloseNotify))
        );
        assert!(!cs.has_received_close_notify);

        let close = AlertMessagePayload::read_bytes(&[1, 0]).unwrap();
        assert_eq!(cs.process_alert(&close), Ok(()));
        assert!(cs.has_received_close_notify);
    }
}
