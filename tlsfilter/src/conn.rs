use core::fmt;
use std::io;
use std::sync::Arc;

use crate::common_state::CommonState;
use crate::enums::{ContentType, ProtocolVersion};
use crate::error::{Error, InvalidMessage, PeerMisbehaved};
#[cfg(feature = "logging")]
use crate::log::{debug, trace};
use crate::msgs::deframer::MessageDeframer;
use crate::msgs::fragmenter::PACKET_OVERHEAD;
use crate::msgs::hsjoiner::HandshakeJoiner;
use crate::msgs::message::{Message, MessagePayload, OpaqueMessage};
use crate::server::hs::{self, State};
use crate::server::ServerConfig;
use crate::suites::Tls12CipherSuite;

/// How far a connection has got.
///
/// The handshake states advance strictly in declaration order; a
/// connection may drop to [`ConnectionState::Error`] or
/// [`ConnectionState::Closed`] from any of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Nothing has happened yet.
    Unauthenticated,
    /// Waiting for the client's ClientHello.
    Authenticating,
    /// ServerHello sent, waiting for ClientKeyExchange.
    HelloReceived,
    /// Keys derived, waiting for the client's ChangeCipherSpec.
    ClientKeyReceived,
    /// Client traffic is protected, waiting for its Finished.
    ChangeCipherSpecReceived,
    /// The handshake completed; application data may flow.
    Authenticated,
    /// The connection failed.
    Error,
    /// The connection was closed.
    Closed,
}

/// Values of this structure are returned from
/// [`ServerConnection::process_new_packets`] and tell the caller the
/// current IO state of the TLS connection.
#[derive(Debug, Default, Eq, PartialEq)]
pub struct IoState {
    tls_bytes_to_write: usize,
    plaintext_bytes_to_read: usize,
    peer_has_closed: bool,
}

impl IoState {
    /// How many bytes could be written by [`ServerConnection::write_tls`]
    /// if called right now.  A non-zero value implies
    /// [`ServerConnection::wants_write`].
    pub fn tls_bytes_to_write(&self) -> usize {
        self.tls_bytes_to_write
    }

    /// How many plaintext bytes could be obtained via [`io::Read`]
    /// without further IO.
    pub fn plaintext_bytes_to_read(&self) -> usize {
        self.plaintext_bytes_to_read
    }

    /// True if the peer has sent us a close_notify alert.  This is
    /// also signalled via returning `Ok(0)` from [`io::Read`], after
    /// all the received bytes have been retrieved.
    pub fn peer_has_closed(&self) -> bool {
        self.peer_has_closed
    }
}

/// The server end of one TLS connection, without any IO.
///
/// Bytes received from the client go in through [`ServerConnection::read_tls`]
/// and are acted upon by [`ServerConnection::process_new_packets`]; bytes
/// for the client come out of [`ServerConnection::write_tls`].  Plaintext
/// is exchanged through [`ServerConnection::reader`] and
/// [`ServerConnection::writer`].
pub struct ServerConnection {
    state: Result<Box<dyn State>, Error>,
    common: CommonState,
    deframer: MessageDeframer,
    handshake_joiner: HandshakeJoiner,
}

impl ServerConnection {
    /// Make a new server connection, waiting for a ClientHello.
    pub fn new(config: Arc<ServerConfig>) -> Result<Self, Error> {
        let mut common = CommonState::new();
        common
            .message_fragmenter
            .set_max_fragment_size(
                config
                    .max_fragment_size()
                    .map(|sz| sz + PACKET_OVERHEAD),
            )?;

        Ok(Self {
            state: Ok(hs::start(config)),
            common,
            deframer: MessageDeframer::new(),
            handshake_joiner: HandshakeJoiner::new(),
        })
    }

    /// Read TLS content from `rd`.  This method does internal
    /// buffering, so `rd` can supply TLS messages in arbitrary-
    /// sized chunks (like a socket or pipe might).
    ///
    /// You should call [`ServerConnection::process_new_packets`] each time
    /// a call to this function succeeds.  `Ok(0)` means `rd` reached EOF.
    pub fn read_tls(&mut self, rd: &mut dyn io::Read) -> io::Result<usize> {
        let n = self.deframer.read(rd)?;
        if n == 0 {
            self.common.has_seen_eof = true;
        }
        Ok(n)
    }

    /// Writes queued TLS records to `wr`, returning how many bytes were
    /// written.  Call this while [`ServerConnection::wants_write`] is true.
    pub fn write_tls(&mut self, wr: &mut dyn io::Write) -> io::Result<usize> {
        self.common.sendable_tls.write_to(wr)
    }

    /// Processes any new packets read by a previous call to
    /// [`ServerConnection::read_tls`].
    ///
    /// Errors from this function are fatal to the connection: the
    /// matching alert, if any, is queued for [`ServerConnection::write_tls`],
    /// and later calls return the same error without doing any work.
    pub fn process_new_packets(&mut self) -> Result<IoState, Error> {
        if let Err(err) = &self.state {
            return Err(err.clone());
        }

        match self.process_records() {
            Ok(()) => Ok(self.current_io_state()),
            Err(err) => {
                debug!("connection failed: {:?}", err);
                self.common.maybe_send_fatal_alert(&err);
                self.state = Err(err.clone());
                Err(err)
            }
        }
    }

    fn process_records(&mut self) -> Result<(), Error> {
        while !self.common.has_received_close_notify {
            let Some(opaque) = self.deframer.pop()? else {
                break;
            };
            self.process_record(opaque)?;
        }

        if self.common.has_seen_eof
            && !self.common.has_received_close_notify
            && self.is_handshaking()
        {
            return Err(Error::Io(io::ErrorKind::UnexpectedEof.into()));
        }

        Ok(())
    }

    fn process_record(&mut self, opaque: OpaqueMessage) -> Result<(), Error> {
        let plain = self
            .common
            .record_layer
            .decrypt_incoming(opaque)?;

        if plain.payload.0.is_empty() {
            if plain.typ == ContentType::ApplicationData {
                trace!("dropping empty application data record");
                return Ok(());
            }
            return Err(InvalidMessage::InvalidEmptyPayload.into());
        }

        if self.handshake_joiner.want_message(&plain) {
            self.handshake_joiner
                .take_message(plain)?;
            while let Some(msg) = self.handshake_joiner.pop() {
                self.process_msg(msg)?;
            }
            return Ok(());
        }

        if !self.handshake_joiner.is_empty() {
            return Err(PeerMisbehaved::MessageInterleavedWithHandshakeMessage.into());
        }

        let msg = Message::try_from(plain)?;
        if let MessagePayload::Alert(alert) = &msg.payload {
            return self.common.process_alert(alert);
        }

        self.process_msg(msg)
    }

    fn process_msg(&mut self, msg: Message) -> Result<(), Error> {
        let state = core::mem::replace(
            &mut self.state,
            Err(Error::General("handshake state in use".into())),
        )?;
        self.state = Ok(state.handle(&mut self.common, msg)?);
        Ok(())
    }

    fn current_io_state(&self) -> IoState {
        IoState {
            tls_bytes_to_write: self.common.sendable_tls.len(),
            plaintext_bytes_to_read: self.common.received_plaintext.len(),
            peer_has_closed: self.common.has_received_close_notify,
        }
    }

    /// Returns an object that allows reading plaintext.
    pub fn reader(&mut self) -> Reader<'_> {
        Reader {
            common: &mut self.common,
        }
    }

    /// Returns an object that allows writing plaintext.
    pub fn writer(&mut self) -> Writer<'_> {
        Writer {
            common: &mut self.common,
        }
    }

    /// Queues a close_notify warning alert to be sent in the next
    /// [`ServerConnection::write_tls`] call.  This informs the peer that
    /// the connection is being closed.  Later calls do nothing.
    pub fn send_close_notify(&mut self) {
        self.common.send_close_notify();
    }

    /// Where this connection is in its lifecycle.
    pub fn state(&self) -> ConnectionState {
        match &self.state {
            Err(_) => ConnectionState::Error,
            Ok(_) if self.common.has_sent_close_notify || self.common.has_received_close_notify => {
                ConnectionState::Closed
            }
            Ok(st) => st.connection_state(),
        }
    }

    /// The protocol version chosen for this connection, once the
    /// ClientHello has been processed.
    pub fn negotiated_version(&self) -> Option<ProtocolVersion> {
        self.common
            .negotiated_version
            .map(|v| v.version)
    }

    /// The cipher suite chosen for this connection, once the ClientHello
    /// has been processed.
    pub fn negotiated_cipher_suite(&self) -> Option<&'static Tls12CipherSuite> {
        self.common.suite
    }

    /// The sequence number of the next record we will receive.
    pub fn read_seq(&self) -> u64 {
        self.common.record_layer.read_seq()
    }

    /// The sequence number of the next record we will send.
    pub fn write_seq(&self) -> u64 {
        self.common.record_layer.write_seq()
    }

    /// Returns true if the caller should call
    /// [`ServerConnection::read_tls`] as soon as possible.
    pub fn wants_read(&self) -> bool {
        self.state.is_ok()
            && !self.common.has_received_close_notify
            && !self.common.has_seen_eof
            && self.common.received_plaintext.is_empty()
    }

    /// Returns true if the caller should call
    /// [`ServerConnection::write_tls`] as soon as possible.
    pub fn wants_write(&self) -> bool {
        self.common.wants_write()
    }

    /// Returns true until the handshake has completed.
    pub fn is_handshaking(&self) -> bool {
        !(self.common.may_send_application_data && self.common.may_receive_application_data)
    }

    /// Encrypt and queue `data`, like [`ServerConnection::writer`] but
    /// without the detour through `io::Error`.
    pub(crate) fn send_plaintext(&mut self, data: &[u8]) -> Result<usize, Error> {
        self.common.send_appdata(data)
    }

    /// Move every queued TLS record into `out`.
    pub(crate) fn drain_tls(&mut self, out: &mut Vec<u8>) {
        while self.common.wants_write() {
            if self.common.sendable_tls.write_to(out).is_err() {
                break;
            }
        }
    }

    pub(crate) fn has_seen_eof(&self) -> bool {
        self.common.has_seen_eof
    }

    pub(crate) fn peer_has_closed(&self) -> bool {
        self.common.has_received_close_notify
    }

    pub(crate) fn error(&self) -> Option<&Error> {
        self.state.as_ref().err()
    }

    pub(crate) fn has_plaintext(&self) -> bool {
        !self.common.received_plaintext.is_empty()
    }
}

impl fmt::Debug for ServerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConnection")
            .field("state", &self.state())
            .field("negotiated_version", &self.negotiated_version())
            .field("suite", &self.negotiated_cipher_suite())
            .finish()
    }
}

/// A structure that implements [`io::Read`] for reading plaintext.
pub struct Reader<'a> {
    common: &'a mut CommonState,
}

impl io::Read for Reader<'_> {
    /// Obtain plaintext data received from the peer over this TLS connection.
    ///
    /// Returns `Ok(0)` once all data has been read if the peer sent
    /// close_notify, or if the transport reached EOF after the handshake.
    /// If there are no bytes to read yet, this returns
    /// `Err(ErrorKind::WouldBlock.into())`.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = self.common.received_plaintext.read(buf)?;
        if len > 0 || buf.is_empty() {
            return Ok(len);
        }

        if self.common.has_received_close_notify
            || (self.common.has_seen_eof && self.common.may_receive_application_data)
        {
            return Ok(0);
        }

        Err(io::ErrorKind::WouldBlock.into())
    }
}

/// A structure that implements [`io::Write`] for writing plaintext.
pub struct Writer<'a> {
    common: &'a mut CommonState,
}

impl io::Write for Writer<'_> {
    /// Send the plaintext `buf` to the peer, encrypting and authenticating
    /// it.  Once this function succeeds you should call
    /// [`ServerConnection::write_tls`] which will output the corresponding
    /// TLS records.
    ///
    /// This fails until the handshake has completed: nothing is buffered.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.common.send_appdata(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use pki_types::{CertificateDer, PrivatePkcs8KeyDer};

    use super::*;

    fn server() -> ServerConnection {
        let config = ServerConfig::new(
            vec![CertificateDer::from(
                include_bytes!("../tests/data/end.cert.der").to_vec(),
            )],
            PrivatePkcs8KeyDer::from(include_bytes!("../tests/data/end.key.der").to_vec()).into(),
        )
        .unwrap();
        ServerConnection::new(Arc::new(config)).unwrap()
    }

    #[test]
    fn new_connection_waits_for_client_hello() {
        let mut conn = server();
        assert_eq!(conn.state(), ConnectionState::Authenticating);
        assert!(conn.is_handshaking());
        assert_eq!(conn.negotiated_version(), None);
        assert_eq!(conn.process_new_packets().unwrap(), IoState::default());
        assert_eq!(
            conn.reader()
                .read(&mut [0u8; 4])
                .unwrap_err()
                .kind(),
            io::ErrorKind::WouldBlock
        );
    }

    #[test]
    fn errors_are_sticky() {
        let mut conn = server();
        // a ChangeCipherSpec is never the first message
        let mut bytes = &[0x14, 0x03, 0x01, 0x00, 0x01, 0x01][..];
        conn.read_tls(&mut bytes).unwrap();

        let err = conn.process_new_packets().unwrap_err();
        assert!(matches!(err, Error::InappropriateMessage { .. }));
        assert_eq!(conn.state(), ConnectionState::Error);
        assert!(conn.wants_write());
        assert!(!conn.wants_read());

        let mut out = Vec::new();
        conn.write_tls(&mut out).unwrap();
        assert_eq!(out, vec![0x15, 0x03, 0x01, 0x00, 0x02, 0x02, 0x0a]);
        assert_eq!(conn.process_new_packets(), Err(err));
        assert!(!conn.wants_write());
    }

    #[test]
    fn read_tls_reports_eof() {
        let mut conn = server();
        assert_eq!(conn.read_tls(&mut &b""[..]).unwrap(), 0);
        assert!(conn.has_seen_eof());
        assert!(!conn.wants_read());
    }
}
