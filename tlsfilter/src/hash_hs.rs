use core::mem;

use crate::crypto::{hash, Tls10Algorithms};
use crate::enums::HandshakeType;
use crate::msgs::message::{Message, MessagePayload};
use crate::suites::Tls12CipherSuite;
use crate::versions::{SupportedProtocolVersion, TranscriptKind};

/// This deals with keeping a running hash of the handshake
/// payloads.  This is computed by buffering initially.  Once
/// we know what hash function we need to use we switch to
/// incremental hashing.
///
/// TLS 1.2 hashes with the cipher suite's hash.  TLS 1.0 and 1.1 keep
/// MD5 and SHA-1 running side by side and concatenate their outputs.
pub struct HandshakeTranscript {
    state: State,
}

enum State {
    Buffering(Vec<u8>),
    Hashing(Contexts),
}

enum Contexts {
    Md5Sha1 {
        md5: Box<dyn hash::Context>,
        sha1: Box<dyn hash::Context>,
    },
    Single(Box<dyn hash::Context>),
}

impl HandshakeTranscript {
    /// Start out buffering.
    pub fn new() -> Self {
        Self {
            state: State::Buffering(Vec::new()),
        }
    }

    /// Hash/buffer a handshake message.
    ///
    /// HelloRequest is never part of the transcript; other record types
    /// are ignored.
    pub fn add_message(&mut self, m: &Message) -> &mut Self {
        if m.is_handshake_type(HandshakeType::HelloRequest) {
            return self;
        }

        if let MessagePayload::Handshake { encoded, .. } = &m.payload {
            self.update_raw(&encoded.0);
        }
        self
    }

    /// Hash or buffer a byte slice.
    fn update_raw(&mut self, buf: &[u8]) {
        match &mut self.state {
            State::Buffering(buffer) => buffer.extend_from_slice(buf),
            State::Hashing(Contexts::Md5Sha1 { md5, sha1 }) => {
                md5.update(buf);
                sha1.update(buf);
            }
            State::Hashing(Contexts::Single(ctx)) => ctx.update(buf),
        }
    }

    /// We now know what hash function the verify_data will use.
    ///
    /// Everything buffered so far is fed into the new hash.  Calling this
    /// again has no effect.
    pub fn start_hash(
        &mut self,
        version: &SupportedProtocolVersion,
        suite: &Tls12CipherSuite,
        tls10: &Tls10Algorithms,
    ) {
        let State::Buffering(buffer) = &mut self.state else {
            return;
        };
        let buffer = mem::take(buffer);

        let mut contexts = match version.transcript {
            TranscriptKind::Md5Sha1 => Contexts::Md5Sha1 {
                md5: tls10.md5.start(),
                sha1: tls10.sha1.start(),
            },
            TranscriptKind::SuiteHash => Contexts::Single(suite.common.hash_provider.start()),
        };

        match &mut contexts {
            Contexts::Md5Sha1 { md5, sha1 } => {
                md5.update(&buffer);
                sha1.update(&buffer);
            }
            Contexts::Single(ctx) => ctx.update(&buffer),
        }

        self.state = State::Hashing(contexts);
    }

    /// Get the current hash value, or `None` if still buffering.
    pub fn current_hash(&self) -> Option<hash::Output> {
        match &self.state {
            State::Buffering(_) => None,
            State::Hashing(Contexts::Md5Sha1 { md5, sha1 }) => Some(hash::Output::concat(
                &md5.fork_finish(),
                &sha1.fork_finish(),
            )),
            State::Hashing(Contexts::Single(ctx)) => Some(ctx.fork_finish()),
        }
    }
}

impl Default for HandshakeTranscript {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::Hash;
    use crate::crypto::rustcrypto::hash::{MD5, SHA1, SHA256};
    use crate::crypto::rustcrypto::{default_provider, TLS_RSA_WITH_AES_128_CBC_SHA};
    use crate::msgs::base::Payload;
    use crate::msgs::handshake::{HandshakeMessagePayload, HandshakePayload};
    use crate::versions::{TLS10, TLS12};

    fn handshake(payload: HandshakePayload) -> Message {
        Message {
            version: crate::enums::ProtocolVersion::TLSv1_2,
            payload: MessagePayload::handshake(HandshakeMessagePayload::new(payload)),
        }
    }

    fn encoded(m: &Message) -> Vec<u8> {
        let mut out = Vec::new();
        m.payload.encode(&mut out);
        out
    }

    #[test]
    fn buffers_then_hashes_with_suite_hash() {
        let provider = default_provider();
        let first = handshake(HandshakePayload::ServerHelloDone);
        let second = handshake(HandshakePayload::Finished(Payload::new(vec![7u8; 12])));

        let mut hs = HandshakeTranscript::new();
        hs.add_message(&first);
        assert!(hs.current_hash().is_none());

        hs.start_hash(&TLS12, TLS_RSA_WITH_AES_128_CBC_SHA, provider.tls10);
        hs.add_message(&second);

        let mut all = encoded(&first);
        all.extend(encoded(&second));
        assert_eq!(
            hs.current_hash().unwrap().as_ref(),
            SHA256.hash(&all).as_ref()
        );
    }

    #[test]
    fn tls10_concatenates_md5_and_sha1() {
        let provider = default_provider();
        let m = handshake(HandshakePayload::ServerHelloDone);

        let mut hs = HandshakeTranscript::new();
        hs.add_message(&m);
        hs.start_hash(&TLS10, TLS_RSA_WITH_AES_128_CBC_SHA, provider.tls10);

        let bytes = encoded(&m);
        let mut expect = MD5.hash(&bytes).as_ref().to_vec();
        expect.extend_from_slice(SHA1.hash(&bytes).as_ref());

        let got = hs.current_hash().unwrap();
        assert_eq!(got.as_ref().len(), 36);
        assert_eq!(got.as_ref(), &expect[..]);
    }

    #[test]
    fn hello_request_is_not_hashed() {
        let provider = default_provider();
        let mut with = HandshakeTranscript::new();
        let mut without = HandshakeTranscript::new();
        for hs in [&mut with, &mut without] {
            hs.start_hash(&TLS12, TLS_RSA_WITH_AES_128_CBC_SHA, provider.tls10);
        }

        with.add_message(&handshake(HandshakePayload::HelloRequest));
        with.add_message(&handshake(HandshakePayload::ServerHelloDone));
        without.add_message(&handshake(HandshakePayload::ServerHelloDone));

        assert_eq!(
            with.current_hash().unwrap().as_ref(),
            without.current_hash().unwrap().as_ref()
        );
    }

    #[test]
    fn snapshot_does_not_disturb_running_hash() {
        let provider = default_provider();
        let mut hs = HandshakeTranscript::new();
        hs.start_hash(&TLS12, TLS_RSA_WITH_AES_128_CBC_SHA, provider.tls10);
        hs.add_message(&handshake(HandshakePayload::ServerHelloDone));
        let a = hs.current_hash().unwrap().as_ref().to_vec();
        let b = hs.current_hash().unwrap().as_ref().to_vec();
        assert_eq!(a, b);
    }
}
