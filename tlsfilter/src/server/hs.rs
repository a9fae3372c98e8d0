use std::sync::Arc;

use subtle::{ConditionallySelectable, ConstantTimeEq};
use zeroize::Zeroizing;

use crate::common_state::{CommonState, Side};
use crate::conn::ConnectionState;
use crate::crypto::{hash, PremasterSecret};
use crate::enums::{AlertDescription, ContentType, HandshakeType, ProtocolVersion};
use crate::error::{Error, PeerIncompatible, PeerMisbehaved};
use crate::hash_hs::HandshakeTranscript;
use crate::key_log::CLIENT_RANDOM;
#[cfg(feature = "logging")]
use crate::log::{debug, trace, warn};
use crate::msgs::base::Payload;
use crate::msgs::ccs::ChangeCipherSpecPayload;
use crate::msgs::enums::Compression;
use crate::msgs::handshake::{
    read_encrypted_premaster, CertificatePayload, ClientHelloPayload, HandshakeMessagePayload,
    HandshakePayload, Random, ServerExtension, ServerHelloPayload, SessionId,
};
use crate::msgs::message::{Message, MessagePayload};
use crate::server::ServerConfig;
use crate::suites::{self, Tls12CipherSuite};
use crate::tls12::{ConnectionRandoms, ConnectionSecrets};
use crate::versions::{self, SupportedProtocolVersion};

pub(crate) type NextState = Box<dyn State>;
pub(crate) type NextStateOrError = Result<NextState, Error>;

/// One state of the server handshake.
///
/// Each inbound message consumes the current state and yields the next;
/// replies are queued on the [`CommonState`] as a side effect.
pub(crate) trait State: Send + Sync {
    fn handle(self: Box<Self>, common: &mut CommonState, m: Message) -> NextStateOrError;

    /// How far the handshake has got.
    fn connection_state(&self) -> ConnectionState;
}

/// The first state of every connection.
pub(crate) fn start(config: Arc<ServerConfig>) -> NextState {
    Box::new(ExpectClientHello { config })
}

fn transcript_hash(transcript: &HandshakeTranscript) -> Result<hash::Output, Error> {
    transcript
        .current_hash()
        .ok_or_else(|| Error::General("handshake hash not started".into()))
}

fn handshake_message(version: ProtocolVersion, payload: HandshakePayload) -> Message {
    Message {
        version,
        payload: MessagePayload::handshake(HandshakeMessagePayload::new(payload)),
    }
}

// --- Process client's ClientHello ---
struct ExpectClientHello {
    config: Arc<ServerConfig>,
}

impl ExpectClientHello {
    fn negotiate_version(
        &self,
        client_hello: &ClientHelloPayload,
    ) -> Result<&'static SupportedProtocolVersion, Error> {
        if client_hello.client_version.get_u16() < ProtocolVersion::TLSv1_0.get_u16() {
            return Err(PeerIncompatible::ProtocolVersionTooLow.into());
        }

        versions::negotiate(&self.config.versions, client_hello.client_version)
            .ok_or_else(|| PeerIncompatible::NoProtocolVersionsInCommon.into())
    }

    fn emit_server_hello(
        &self,
        common: &mut CommonState,
        transcript: &mut HandshakeTranscript,
        version: &'static SupportedProtocolVersion,
        suite: &'static Tls12CipherSuite,
        server_random: Random,
        secure_renegotiation: bool,
    ) -> Result<(), Error> {
        let mut extensions = Vec::new();
        if secure_renegotiation {
            extensions.push(ServerExtension::make_empty_renegotiation_info());
        }

        let sh = handshake_message(
            version.version,
            HandshakePayload::ServerHello(ServerHelloPayload {
                server_version: version.version,
                random: server_random,
                session_id: SessionId::empty(),
                cipher_suite: suite.suite(),
                compression_method: Compression::Null,
                extensions,
            }),
        );

        trace!("sending server hello {:?}", sh);
        transcript.add_message(&sh);
        common.send_msg(sh)
    }

    fn emit_certificate(
        &self,
        common: &mut CommonState,
        transcript: &mut HandshakeTranscript,
        version: ProtocolVersion,
    ) -> Result<(), Error> {
        if self.config.cert_chain.is_empty() {
            return Ok(());
        }

        let c = handshake_message(
            version,
            HandshakePayload::Certificate(CertificatePayload(self.config.cert_chain.to_vec())),
        );

        transcript.add_message(&c);
        common.send_msg(c)
    }
}

fn emit_server_hello_done(
    common: &mut CommonState,
    transcript: &mut HandshakeTranscript,
    version: ProtocolVersion,
) -> Result<(), Error> {
    let m = handshake_message(version, HandshakePayload::ServerHelloDone);
    transcript.add_message(&m);
    common.send_msg(m)
}

impl State for ExpectClientHello {
    fn handle(self: Box<Self>, common: &mut CommonState, m: Message) -> NextStateOrError {
        let client_hello =
            require_handshake_msg!(m, HandshakeType::ClientHello, HandshakePayload::ClientHello)?;
        trace!("we got a clienthello {:?}", client_hello);

        let version = self.negotiate_version(client_hello)?;

        if !client_hello
            .compression_methods
            .contains(&Compression::Null)
        {
            return Err(PeerIncompatible::NullCompressionRequired.into());
        }

        // RFC 5746: this is an initial handshake, so any renegotiation_info
        // must be empty.
        if let Some(info) = client_hello.renegotiation_info() {
            if !info.0.is_empty() {
                return Err(PeerMisbehaved::InvalidRenegotiationInfo.into());
            }
        }

        let suite = suites::choose_ciphersuite_preferring_server(
            &client_hello.cipher_suites,
            &self.config.cipher_suites,
            version.version,
        )
        .ok_or(Error::PeerIncompatible(
            PeerIncompatible::NoCipherSuitesInCommon,
        ))?;

        debug!(
            "decided upon suite {:?} for {:?}",
            suite.suite(),
            version.version
        );
        common.negotiated_version = Some(version);
        common.suite = Some(suite);

        let provider = self.config.crypto_provider();
        let mut transcript = HandshakeTranscript::new();
        transcript.add_message(&m);
        transcript.start_hash(version, suite, provider.tls10);

        let server_random = Random::new(provider.secure_random)?;
        let randoms = ConnectionRandoms::new(client_hello.random, server_random);

        self.emit_server_hello(
            common,
            &mut transcript,
            version,
            suite,
            server_random,
            client_hello.offers_secure_renegotiation(),
        )?;
        self.emit_certificate(common, &mut transcript, version.version)?;
        emit_server_hello_done(common, &mut transcript, version.version)?;

        Ok(Box::new(ExpectClientKx {
            config: self.config,
            transcript,
            randoms,
            suite,
            version,
            client_version: client_hello.client_version,
        }))
    }

    fn connection_state(&self) -> ConnectionState {
        ConnectionState::Authenticating
    }
}

// --- Process client's KeyExchange ---
struct ExpectClientKx {
    config: Arc<ServerConfig>,
    transcript: HandshakeTranscript,
    randoms: ConnectionRandoms,
    suite: &'static Tls12CipherSuite,
    version: &'static SupportedProtocolVersion,
    client_version: ProtocolVersion,
}

impl ExpectClientKx {
    /// Decrypt the premaster secret, without revealing whether that worked.
    ///
    /// Per RFC 5246 section 7.4.7.1, a bad padding, wrong length or wrong
    /// embedded version all yield a random premaster instead.  The two sides
    /// then hold different keys, so the client's Finished record fails its
    /// MAC (`bad_record_mac`), exactly as a corrupted record would.
    fn decrypt_premaster(&self, encrypted: &[u8]) -> Result<PremasterSecret, Error> {
        let mut premaster = PremasterSecret([0u8; 48]);
        self.config
            .crypto_provider()
            .secure_random
            .fill(&mut premaster.0)?;

        let decrypted = Zeroizing::new(
            self.config
                .key
                .decrypt_pkcs1(encrypted)
                .unwrap_or_default(),
        );

        if decrypted.len() == premaster.0.len() {
            let [major, minor] = self.client_version.get_u16().to_be_bytes();
            let version_ok = decrypted[0].ct_eq(&major) & decrypted[1].ct_eq(&minor);
            for (p, d) in premaster.0.iter_mut().zip(decrypted.iter()) {
                p.conditional_assign(d, version_ok);
            }
        }

        Ok(premaster)
    }
}

impl State for ExpectClientKx {
    fn handle(mut self: Box<Self>, common: &mut CommonState, m: Message) -> NextStateOrError {
        // A client certificate is ignored: we never ask for one.
        if let MessagePayload::Handshake {
            parsed:
                HandshakeMessagePayload {
                    payload: HandshakePayload::Certificate(_),
                    ..
                },
            ..
        } = &m.payload
        {
            debug!("ignoring client certificate");
            self.transcript.add_message(&m);
            return Ok(self);
        }

        let client_kx = require_handshake_msg!(
            m,
            HandshakeType::ClientKeyExchange,
            HandshakePayload::ClientKeyExchange
        )?;

        let encrypted = read_encrypted_premaster(client_kx)?;
        let premaster = self.decrypt_premaster(&encrypted.0)?;
        self.transcript.add_message(&m);

        let secrets = ConnectionSecrets::from_premaster(
            &premaster.0,
            self.randoms,
            self.suite,
            self.version,
            self.config.crypto_provider().tls10,
        );
        drop(premaster);

        if self.config.key_log.will_log(CLIENT_RANDOM) {
            self.config.key_log.log(
                CLIENT_RANDOM,
                &secrets.randoms().client,
                secrets.master_secret(),
            );
        }

        let (dec, enc) =
            secrets.make_cipher_pair(Side::Server, self.config.crypto_provider().secure_random);
        common
            .record_layer
            .prepare_message_decrypter(dec);
        common
            .record_layer
            .prepare_message_encrypter(enc);

        Ok(Box::new(ExpectCcs {
            secrets,
            transcript: self.transcript,
        }))
    }

    fn connection_state(&self) -> ConnectionState {
        ConnectionState::HelloReceived
    }
}

// --- Process client's ChangeCipherSpec ---
struct ExpectCcs {
    secrets: ConnectionSecrets,
    transcript: HandshakeTranscript,
}

impl State for ExpectCcs {
    fn handle(mut self: Box<Self>, common: &mut CommonState, m: Message) -> NextStateOrError {
        match &m.payload {
            MessagePayload::ChangeCipherSpec(..) => {}
            MessagePayload::Handshake { parsed, .. }
                if parsed.typ == HandshakeType::CertificateVerify =>
            {
                debug!("ignoring client CertificateVerify");
                self.transcript.add_message(&m);
                return Ok(self);
            }
            payload => {
                return Err(crate::check::inappropriate_message(
                    payload,
                    &[ContentType::ChangeCipherSpec],
                ));
            }
        }

        common.record_layer.start_decrypting();
        let handshake_hash = transcript_hash(&self.transcript)?;

        Ok(Box::new(ExpectFinished {
            secrets: self.secrets,
            transcript: self.transcript,
            handshake_hash,
        }))
    }

    fn connection_state(&self) -> ConnectionState {
        ConnectionState::ClientKeyReceived
    }
}

// --- Process client's Finished ---
struct ExpectFinished {
    secrets: ConnectionSecrets,
    transcript: HandshakeTranscript,
    /// Transcript as of the client's ChangeCipherSpec.
    handshake_hash: hash::Output,
}

fn emit_ccs(common: &mut CommonState, version: ProtocolVersion) -> Result<(), Error> {
    let m = Message {
        version,
        payload: MessagePayload::ChangeCipherSpec(ChangeCipherSpecPayload {}),
    };

    common.send_msg(m)
}

fn emit_finished(
    secrets: &ConnectionSecrets,
    transcript: &mut HandshakeTranscript,
    common: &mut CommonState,
) -> Result<(), Error> {
    let vh = transcript_hash(transcript)?;
    let verify_data = secrets.server_verify_data(&vh);

    let f = handshake_message(
        secrets.version().version,
        HandshakePayload::Finished(Payload::new(verify_data)),
    );

    transcript.add_message(&f);
    common.send_msg(f)
}

impl State for ExpectFinished {
    fn handle(mut self: Box<Self>, common: &mut CommonState, m: Message) -> NextStateOrError {
        let finished =
            require_handshake_msg!(m, HandshakeType::Finished, HandshakePayload::Finished)?;

        let expect_verify_data = self
            .secrets
            .client_verify_data(&self.handshake_hash);

        if !bool::from(ConstantTimeEq::ct_eq(&expect_verify_data[..], finished.bytes())) {
            warn!("client Finished did not verify");
            return Err(Error::FinishedMismatch);
        }

        self.transcript.add_message(&m);
        emit_ccs(common, self.secrets.version().version)?;
        common.record_layer.start_encrypting();
        emit_finished(&self.secrets, &mut self.transcript, common)?;

        debug!("handshake complete");
        common.may_send_application_data = true;
        common.may_receive_application_data = true;
        Ok(Box::new(ExpectTraffic {}))
    }

    fn connection_state(&self) -> ConnectionState {
        ConnectionState::ChangeCipherSpecReceived
    }
}

// --- Process traffic ---
struct ExpectTraffic {}

impl State for ExpectTraffic {
    fn handle(self: Box<Self>, common: &mut CommonState, m: Message) -> NextStateOrError {
        match m.payload {
            MessagePayload::ApplicationData(payload) => common.take_received_plaintext(payload),
            MessagePayload::Handshake { parsed, .. }
                if parsed.typ == HandshakeType::ClientHello =>
            {
                common.send_warning_alert(AlertDescription::NoRenegotiation);
            }
            payload => {
                return Err(crate::check::inappropriate_message(
                    &payload,
                    &[ContentType::ApplicationData],
                ));
            }
        }
        Ok(self)
    }

    fn connection_state(&self) -> ConnectionState {
        ConnectionState::Authenticated
    }
}
