#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Context, Poll};

use rand_core::{OsRng, RngCore};
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

use tlsfilter::crypto::rustcrypto;
use tlsfilter::internal::hash_hs::HandshakeTranscript;
use tlsfilter::internal::msgs::alert::AlertMessagePayload;
use tlsfilter::internal::msgs::base::{Payload, PayloadU16, PayloadU8};
use tlsfilter::internal::msgs::ccs::ChangeCipherSpecPayload;
use tlsfilter::internal::msgs::codec::Codec;
use tlsfilter::internal::msgs::deframer::MessageDeframer;
use tlsfilter::internal::msgs::enums::Compression;
use tlsfilter::internal::msgs::handshake::{
    CertificatePayload, ClientExtension, ClientHelloPayload, HandshakeMessagePayload,
    HandshakePayload, Random, ServerHelloPayload, SessionId,
};
use tlsfilter::internal::msgs::hsjoiner::HandshakeJoiner;
use tlsfilter::internal::msgs::message::{Message, MessagePayload, PlainMessage};
use tlsfilter::internal::record_layer::RecordLayer;
use tlsfilter::internal::tls12::{ConnectionRandoms, ConnectionSecrets};
use tlsfilter::internal::Side;
use tlsfilter::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tlsfilter::{
    AlertDescription, AlertLevel, CipherSuite, ContentType, Error, IoState, ProtocolVersion,
    ServerConfig, ServerConnection, SupportedProtocolVersion, Tls12CipherSuite, Transport,
    ALL_VERSIONS,
};

pub fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .try_init();
}

pub fn cert_chain() -> Vec<CertificateDer<'static>> {
    vec![CertificateDer::from(
        include_bytes!("../data/end.cert.der").to_vec(),
    )]
}

pub fn private_key() -> PrivateKeyDer<'static> {
    PrivatePkcs8KeyDer::from(include_bytes!("../data/end.key.der").to_vec()).into()
}

pub fn make_config() -> ServerConfig {
    ServerConfig::new(cert_chain(), private_key()).unwrap()
}

pub fn public_key() -> RsaPublicKey {
    RsaPrivateKey::from_pkcs8_der(include_bytes!("../data/end.key.der"))
        .unwrap()
        .to_public_key()
}

pub fn all_suites() -> Vec<CipherSuite> {
    rustcrypto::ALL_CIPHER_SUITES
        .iter()
        .map(|cs| cs.suite())
        .collect()
}

/// Feed `bytes` to the server, processing as we go.
pub fn transfer_to_server(server: &mut ServerConnection, bytes: &[u8]) -> Result<IoState, Error> {
    let mut rd = bytes;
    loop {
        server.read_tls(&mut rd).unwrap();
        let state = server.process_new_packets();
        if state.is_err() || rd.is_empty() {
            return state;
        }
    }
}

/// Everything the server has queued to send.
pub fn server_output(server: &mut ServerConnection) -> Vec<u8> {
    let mut out = Vec::new();
    while server.wants_write() {
        server.write_tls(&mut out).unwrap();
    }
    out
}

/// Run a complete handshake between `server` and `client`.
pub fn do_handshake(server: &mut ServerConnection, client: &mut TestClient) {
    let hello = client.client_hello();
    transfer_to_server(server, &hello).unwrap();
    client.receive(&server_output(server));
    assert!(client.server_hello_done);

    let flight = client.key_exchange();
    transfer_to_server(server, &flight).unwrap();
    client.receive(&server_output(server));
    assert!(client.handshake_done);
}

/// How the client's second flight should deviate from a plain one, if at all.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeyExchangeFaults {
    /// Version written into the premaster secret, instead of the one
    /// offered in the ClientHello.
    pub premaster_version: Option<ProtocolVersion>,
    pub corrupt_finished: bool,
    /// Send bytes that are not an RSA ciphertext in place of the encrypted
    /// premaster, keeping the real premaster for our own keys.
    pub undecryptable_premaster: bool,
    /// Send an unrequested Certificate and CertificateVerify.
    pub client_certificate: bool,
}

/// A minimal TLS client, built from the crate's codec and record layer.
///
/// It trusts whatever the server sends: the point is to drive the server.
pub struct TestClient {
    pub offered_version: ProtocolVersion,
    pub offered_suites: Vec<CipherSuite>,
    pub compression_methods: Vec<Compression>,
    pub extensions: Vec<ClientExtension>,
    pub random: Random,

    deframer: MessageDeframer,
    joiner: HandshakeJoiner,
    pub record_layer: RecordLayer,
    transcript: HandshakeTranscript,

    pub version: Option<&'static SupportedProtocolVersion>,
    pub suite: Option<&'static Tls12CipherSuite>,
    pub server_hello: Option<ServerHelloPayload>,
    pub server_certs: Option<Vec<CertificateDer<'static>>>,
    pub server_hello_done: bool,
    pub handshake_done: bool,
    secrets: Option<ConnectionSecrets>,

    pub plaintext: Vec<u8>,
    /// Plaintext length of every application data record received.
    pub app_record_lens: Vec<usize>,
    pub alerts: Vec<AlertMessagePayload>,
    pub error: Option<Error>,
}

impl TestClient {
    pub fn new(offered_version: ProtocolVersion, offered_suites: &[CipherSuite]) -> Self {
        let mut random = [0u8; 32];
        OsRng.fill_bytes(&mut random);

        Self {
            offered_version,
            offered_suites: offered_suites.to_vec(),
            compression_methods: vec![Compression::Null],
            extensions: Vec::new(),
            random: Random::from(random),
            deframer: MessageDeframer::new(),
            joiner: HandshakeJoiner::new(),
            record_layer: RecordLayer::new(),
            transcript: HandshakeTranscript::new(),
            version: None,
            suite: None,
            server_hello: None,
            server_certs: None,
            server_hello_done: false,
            handshake_done: false,
            secrets: None,
            plaintext: Vec::new(),
            app_record_lens: Vec::new(),
            alerts: Vec::new(),
            error: None,
        }
    }

    pub fn tls12() -> Self {
        Self::new(ProtocolVersion::TLSv1_2, &all_suites())
    }

    fn record_version(&self) -> ProtocolVersion {
        self.version
            .map(|v| v.version)
            .unwrap_or(ProtocolVersion::TLSv1_0)
    }

    pub fn client_hello_message(&self) -> Message {
        let hello = ClientHelloPayload {
            client_version: self.offered_version,
            random: self.random,
            session_id: SessionId::empty(),
            cipher_suites: self.offered_suites.clone(),
            compression_methods: self.compression_methods.clone(),
            extensions: self.extensions.clone(),
        };

        Message {
            version: ProtocolVersion::TLSv1_0,
            payload: MessagePayload::handshake(HandshakeMessagePayload::new(
                HandshakePayload::ClientHello(hello),
            )),
        }
    }

    /// The ClientHello record.
    pub fn client_hello(&mut self) -> Vec<u8> {
        let m = self.client_hello_message();
        self.transcript.add_message(&m);
        self.seal(m)
    }

    /// The ClientHello, split over records of at most `fragment_len` bytes.
    pub fn fragmented_client_hello(&mut self, fragment_len: usize) -> Vec<u8> {
        let m = self.client_hello_message();
        self.transcript.add_message(&m);

        let mut body = Vec::new();
        m.payload.encode(&mut body);

        let mut out = Vec::new();
        for chunk in body.chunks(fragment_len) {
            out.extend(self.seal_plain(ContentType::Handshake, chunk));
        }
        out
    }

    /// The correct ClientKeyExchange, ChangeCipherSpec and Finished flight.
    pub fn key_exchange(&mut self) -> Vec<u8> {
        self.key_exchange_with(KeyExchangeFaults::default())
    }

    pub fn key_exchange_with(&mut self, faults: KeyExchangeFaults) -> Vec<u8> {
        let version = self
            .version
            .expect("no ServerHello yet");
        let suite = self.suite.unwrap();
        let provider = rustcrypto::default_provider();

        let mut premaster = [0u8; 48];
        OsRng.fill_bytes(&mut premaster);
        let pms_version = faults
            .premaster_version
            .unwrap_or(self.offered_version);
        premaster[..2].copy_from_slice(&pms_version.get_u16().to_be_bytes());

        let encrypted = match faults.undecryptable_premaster {
            true => vec![0x55; 256],
            false => public_key()
                .encrypt(&mut OsRng, Pkcs1v15Encrypt, &premaster)
                .unwrap(),
        };
        let mut body = Vec::new();
        PayloadU16::new(encrypted).encode(&mut body);

        let mut out = Vec::new();
        if faults.client_certificate {
            out.extend(self.send_handshake(HandshakePayload::Certificate(CertificatePayload(
                cert_chain(),
            ))));
        }
        out.extend(self.send_handshake(HandshakePayload::ClientKeyExchange(Payload::new(body))));
        if faults.client_certificate {
            out.extend(self.send_handshake(HandshakePayload::CertificateVerify(Payload::new(
                vec![0x04, 0x01, 0x00, 0x00],
            ))));
        }

        let server_random = self
            .server_hello
            .as_ref()
            .unwrap()
            .random;
        let secrets = ConnectionSecrets::from_premaster(
            &premaster,
            ConnectionRandoms::new(self.random, server_random),
            suite,
            version,
            provider.tls10,
        );
        let (dec, enc) = secrets.make_cipher_pair(Side::Client, provider.secure_random);
        self.record_layer
            .prepare_message_decrypter(dec);
        self.record_layer
            .prepare_message_encrypter(enc);

        out.extend(self.seal(Message {
            version: version.version,
            payload: MessagePayload::ChangeCipherSpec(ChangeCipherSpecPayload {}),
        }));
        self.record_layer.start_encrypting();

        let hash = self.transcript.current_hash().unwrap();
        let mut verify_data = secrets.client_verify_data(&hash);
        if faults.corrupt_finished {
            verify_data[0] ^= 0x01;
        }
        self.secrets = Some(secrets);
        out.extend(self.send_handshake(HandshakePayload::Finished(Payload::new(verify_data))));
        out
    }

    pub fn send_handshake(&mut self, payload: HandshakePayload) -> Vec<u8> {
        let m = Message {
            version: self.record_version(),
            payload: MessagePayload::handshake(HandshakeMessagePayload::new(payload)),
        };
        self.transcript.add_message(&m);
        self.seal(m)
    }

    pub fn send_application_data(&mut self, data: &[u8]) -> Vec<u8> {
        self.seal_plain(ContentType::ApplicationData, data)
    }

    pub fn send_alert(&mut self, level: AlertLevel, description: AlertDescription) -> Vec<u8> {
        self.seal(Message::build_alert(level, description))
    }

    pub fn seal(&mut self, m: Message) -> Vec<u8> {
        let mut payload = Vec::new();
        m.payload.encode(&mut payload);
        let typ = m.payload.content_type();
        self.seal_plain(typ, &payload)
    }

    pub fn seal_plain(&mut self, typ: ContentType, payload: &[u8]) -> Vec<u8> {
        let plain = PlainMessage {
            typ,
            version: self.record_version(),
            payload: Payload::new(payload.to_vec()),
        };
        self.record_layer
            .encrypt_outgoing(plain.borrow())
            .unwrap()
            .encode()
    }

    /// Process bytes from the server.  A failure is kept in `self.error`
    /// and stops further processing.
    pub fn receive(&mut self, mut bytes: &[u8]) {
        while !bytes.is_empty() && self.error.is_none() {
            self.deframer.read(&mut bytes).unwrap();
            if let Err(err) = self.process_records() {
                self.error = Some(err);
            }
        }
    }

    fn process_records(&mut self) -> Result<(), Error> {
        while let Some(opaque) = self.deframer.pop()? {
            let plain = self
                .record_layer
                .decrypt_incoming(opaque)?;

            if self.joiner.want_message(&plain) {
                self.joiner.take_message(plain)?;
                while let Some(m) = self.joiner.pop() {
                    self.handle_handshake(m)?;
                }
                continue;
            }

            let typ = plain.typ;
            let len = plain.payload.0.len();
            let m = Message::try_from(plain)?;
            match m.payload {
                MessagePayload::ChangeCipherSpec(_) => self.record_layer.start_decrypting(),
                MessagePayload::Alert(alert) => self.alerts.push(alert),
                MessagePayload::ApplicationData(payload) => {
                    assert_eq!(typ, ContentType::ApplicationData);
                    self.app_record_lens.push(len);
                    self.plaintext.extend(payload.0);
                }
                MessagePayload::Handshake { .. } => unreachable!(),
            }
        }
        Ok(())
    }

    fn handle_handshake(&mut self, m: Message) -> Result<(), Error> {
        let MessagePayload::Handshake { parsed, .. } = &m.payload else {
            unreachable!();
        };

        match &parsed.payload {
            HandshakePayload::ServerHello(sh) => {
                let version = ALL_VERSIONS
                    .iter()
                    .find(|v| v.version == sh.server_version)
                    .copied()
                    .expect("server chose unknown version");
                let suite = rustcrypto::ALL_CIPHER_SUITES
                    .iter()
                    .find(|cs| cs.suite() == sh.cipher_suite)
                    .copied()
                    .expect("server chose unknown suite");
                self.version = Some(version);
                self.suite = Some(suite);
                self.server_hello = Some(sh.clone());
                self.transcript.add_message(&m);
                self.transcript.start_hash(
                    version,
                    suite,
                    rustcrypto::default_provider().tls10,
                );
            }
            HandshakePayload::Certificate(chain) => {
                self.server_certs = Some(chain.0.clone());
                self.transcript.add_message(&m);
            }
            HandshakePayload::ServerHelloDone => {
                self.server_hello_done = true;
                self.transcript.add_message(&m);
            }
            HandshakePayload::Finished(verify_data) => {
                let hash = self.transcript.current_hash().unwrap();
                let expected = self
                    .secrets
                    .as_ref()
                    .unwrap()
                    .server_verify_data(&hash);
                assert_eq!(expected, verify_data.0, "server Finished is wrong");
                self.transcript.add_message(&m);
                self.handshake_done = true;
            }
            other => panic!("unexpected handshake message {:?}", other),
        }
        Ok(())
    }

    pub fn offer_secure_renegotiation(&mut self) {
        self.extensions
            .push(ClientExtension::RenegotiationInfo(PayloadU8::new(Vec::new())));
    }

    pub fn take_plaintext(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.plaintext)
    }

    pub fn has_alert(&self, description: AlertDescription) -> bool {
        self.alerts
            .iter()
            .any(|a| a.description == description)
    }
}

/// One direction of an in-memory byte stream.
#[derive(Default)]
pub struct Pipe {
    state: Mutex<PipeState>,
    readable: Condvar,
}

#[derive(Default)]
struct PipeState {
    buf: VecDeque<u8>,
    closed: bool,
}

impl Pipe {
    /// Block until some bytes are available or the pipe is closed.
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        while state.buf.is_empty() && !state.closed {
            state = self.readable.wait(state).unwrap();
        }

        let n = buf.len().min(state.buf.len());
        for (dst, src) in buf.iter_mut().zip(state.buf.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    pub fn write(&self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        state.buf.extend(data);
        self.readable.notify_all();
        Ok(data.len())
    }

    pub fn close(&self) {
        self.state.lock().unwrap().closed = true;
        self.readable.notify_all();
    }
}

/// One end of an in-memory connection.
#[derive(Clone)]
pub struct Duplex {
    pub rx: Arc<Pipe>,
    pub tx: Arc<Pipe>,
}

pub fn duplex() -> (Duplex, Duplex) {
    let a = Arc::new(Pipe::default());
    let b = Arc::new(Pipe::default());
    (
        Duplex {
            rx: a.clone(),
            tx: b.clone(),
        },
        Duplex { rx: b, tx: a },
    )
}

impl Duplex {
    /// Read from the pipe into `client` until `done` holds.  Returns false
    /// if the pipe closed first.
    pub fn pump_client(&self, client: &mut TestClient, done: impl Fn(&TestClient) -> bool) -> bool {
        let mut buf = [0u8; 4096];
        while !done(client) {
            let n = self.rx.read(&mut buf).unwrap();
            if n == 0 {
                return false;
            }
            client.receive(&buf[..n]);
        }
        true
    }

    pub fn send(&self, data: &[u8]) {
        self.tx.write(data).unwrap();
    }
}

impl Transport for Duplex {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.rx.read(buf)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.tx.write(buf)
    }

    fn flush(&self) -> io::Result<()> {
        Ok(())
    }

    fn shutdown(&self) -> io::Result<()> {
        self.rx.close();
        self.tx.close();
        Ok(())
    }
}

// Reads block the polling thread; tests run the async side on its own
// thread with `futures::executor::block_on`.
impl futures::io::AsyncRead for Duplex {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(self.rx.read(buf))
    }
}

impl futures::io::AsyncWrite for Duplex {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(self.tx.write(buf))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.tx.close();
        Poll::Ready(Ok(()))
    }
}
