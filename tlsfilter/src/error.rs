use core::fmt;
use std::error::Error as StdError;
use std::io;

use crate::crypto::GetRandomFailed;
use crate::enums::{AlertDescription, ContentType, HandshakeType};

/// tlsfilter reports protocol errors using this type.
///
/// Every variant except [`Error::AlertReceived`] and [`Error::Io`] is a
/// condition detected locally; [`Error::alert`] gives the alert that is sent
/// to the peer before the connection fails.
#[non_exhaustive]
#[derive(Debug, PartialEq, Clone)]
pub enum Error {
    /// We received a TLS message that isn't valid right now.
    /// `expect_types` lists the message types we can expect right now.
    /// `got_type` is the type we found.  This error is typically
    /// caused by a buggy TLS stack (the peer or this one), a broken
    /// network, or an attack.
    InappropriateMessage {
        /// Which types we expected
        expect_types: Vec<ContentType>,
        /// What type we received
        got_type: ContentType,
    },

    /// We received a TLS handshake message that isn't valid right now.
    /// `expect_types` lists the handshake message types we can expect
    /// right now.  `got_type` is the type we found.
    InappropriateHandshakeMessage {
        /// Which handshake type we expected
        expect_types: Vec<HandshakeType>,
        /// What handshake type we received
        got_type: HandshakeType,
    },

    /// The peer sent us a TLS message with invalid contents.
    InvalidMessage(InvalidMessage),

    /// We couldn't decrypt a record: its MAC or its padding was wrong.
    /// The two causes are deliberately not distinguished.
    DecryptError,

    /// The client's Finished message did not match our transcript.
    FinishedMismatch,

    /// We couldn't encrypt a message: the write sequence number is exhausted.
    EncryptError,

    /// The peer doesn't support a protocol version/feature we require.
    /// The parameter gives a hint as to what version/feature it is.
    PeerIncompatible(PeerIncompatible),

    /// The peer deviated from the standard TLS protocol.
    /// The parameter gives a hint where.
    PeerMisbehaved(PeerMisbehaved),

    /// We received a fatal alert.  This means the peer is unhappy.
    AlertReceived(AlertDescription),

    /// A catch-all error for unlikely errors.
    General(String),

    /// We failed to acquire random bytes from the system.
    FailedToGetRandomBytes,

    /// This function doesn't work until the TLS handshake
    /// is complete.
    HandshakeNotComplete,

    /// The peer sent an oversized record/fragment.
    PeerSentOversizedRecord,

    /// A read or write was started while another of the same kind
    /// was still outstanding on this connection.
    ConcurrentOperation,

    /// The connection was closed, by us or by the peer's close_notify.
    ConnectionClosed,

    /// The `max_fragment_size` value supplied in configuration was too small,
    /// or too large.
    BadMaxFragmentSize,

    /// The underlying transport failed.
    Io(IoError),
}

impl Error {
    /// The fatal alert we send when failing with this error.
    ///
    /// Returns `None` for conditions the peer should not be told about:
    /// alerts we received, transport failures, and local misuse.
    pub fn alert(&self) -> Option<AlertDescription> {
        Some(match self {
            Self::InappropriateMessage { .. } | Self::InappropriateHandshakeMessage { .. } => {
                AlertDescription::UnexpectedMessage
            }
            Self::InvalidMessage(InvalidMessage::InvalidCcs) => AlertDescription::IllegalParameter,
            Self::InvalidMessage(_) => AlertDescription::DecodeError,
            Self::DecryptError => AlertDescription::BadRecordMac,
            Self::FinishedMismatch => AlertDescription::DecryptError,
            Self::PeerSentOversizedRecord => AlertDescription::RecordOverflow,
            Self::PeerIncompatible(PeerIncompatible::ProtocolVersionTooLow)
            | Self::PeerIncompatible(PeerIncompatible::NoProtocolVersionsInCommon) => {
                AlertDescription::ProtocolVersion
            }
            Self::PeerIncompatible(_) => AlertDescription::HandshakeFailure,
            Self::PeerMisbehaved(PeerMisbehaved::HandshakeMessageTooLarge) => {
                AlertDescription::HandshakeFailure
            }
            Self::PeerMisbehaved(PeerMisbehaved::MessageInterleavedWithHandshakeMessage) => {
                AlertDescription::UnexpectedMessage
            }
            Self::PeerMisbehaved(PeerMisbehaved::InvalidRenegotiationInfo) => {
                AlertDescription::HandshakeFailure
            }
            Self::PeerMisbehaved(_) => AlertDescription::IllegalParameter,
            Self::EncryptError
            | Self::FailedToGetRandomBytes
            | Self::General(_)
            | Self::BadMaxFragmentSize => AlertDescription::InternalError,
            Self::AlertReceived(_)
            | Self::Io(_)
            | Self::HandshakeNotComplete
            | Self::ConcurrentOperation
            | Self::ConnectionClosed => return None,
        })
    }
}

/// A corrupt TLS message payload that resulted in an error.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InvalidMessage {
    /// The peer sent us a syntactically incorrect ChangeCipherSpec payload.
    InvalidCcs,
    /// An unknown content type was encountered during message decoding.
    InvalidContentType,
    /// A message was zero-length when its record kind forbids it.
    InvalidEmptyPayload,
    /// A TLS message payload was larger than the protocol allows.
    MessageTooLarge,
    /// Message is shorter than the expected length
    MessageTooShort,
    /// Missing data for the named handshake payload value
    MissingData(&'static str),
    /// Trailing data found for the named handshake payload value
    TrailingData(&'static str),
    /// An unknown TLS protocol was encountered during message decoding.
    UnknownProtocolVersion,
    /// A peer sent a compression method list without the null method.
    UnsupportedCompression,
}

impl From<InvalidMessage> for Error {
    #[inline]
    fn from(e: InvalidMessage) -> Self {
        Self::InvalidMessage(e)
    }
}

#[non_exhaustive]
#[allow(missing_docs)]
#[derive(Debug, PartialEq, Clone)]
/// The set of cases where we failed to make a connection because we thought
/// the peer was misbehaving.
///
/// This is `non_exhaustive`: we might add or stop using items here in minor
/// versions.  We also don't document what they mean.
pub enum PeerMisbehaved {
    HandshakeMessageTooLarge,
    InvalidRenegotiationInfo,
    MessageInterleavedWithHandshakeMessage,
    UnexpectedEmptyRecord,
}

impl From<PeerMisbehaved> for Error {
    #[inline]
    fn from(e: PeerMisbehaved) -> Self {
        Self::PeerMisbehaved(e)
    }
}

#[non_exhaustive]
#[allow(missing_docs)]
#[derive(Debug, PartialEq, Clone)]
/// The set of cases where we failed to make a connection because a peer
/// doesn't support a TLS version/feature we require.
///
/// This is `non_exhaustive`: we might add or stop using items here in minor
/// versions.
pub enum PeerIncompatible {
    NoCipherSuitesInCommon,
    NoProtocolVersionsInCommon,
    NullCompressionRequired,
    ProtocolVersionTooLow,
}

impl From<PeerIncompatible> for Error {
    #[inline]
    fn from(e: PeerIncompatible) -> Self {
        Self::PeerIncompatible(e)
    }
}

/// A transport error, wrapped so that [`Error`] can stay `Clone` and
/// `PartialEq`.
///
/// Two `IoError`s compare equal when their kinds match.
#[derive(Debug, Clone)]
pub struct IoError {
    kind: io::ErrorKind,
    message: String,
}

impl IoError {
    /// The kind of the underlying `std::io::Error`.
    pub fn kind(&self) -> io::ErrorKind {
        self.kind
    }
}

impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl From<io::Error> for IoError {
    fn from(e: io::Error) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

impl From<io::ErrorKind> for IoError {
    fn from(kind: io::ErrorKind) -> Self {
        Self {
            kind,
            message: io::Error::from(kind).to_string(),
        }
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<io::Error> for Error {
    #[inline]
    fn from(e: io::Error) -> Self {
        Self::Io(e.into())
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(err) => Self::new(err.kind, err.message),
            Error::ConnectionClosed => Self::new(io::ErrorKind::BrokenPipe, e),
            Error::ConcurrentOperation | Error::HandshakeNotComplete => {
                Self::new(io::ErrorKind::Other, e)
            }
            _ => Self::new(io::ErrorKind::InvalidData, e),
        }
    }
}

fn join<T: fmt::Debug>(items: &[T]) -> String {
    items
        .iter()
        .map(|x| format!("{:?}", x))
        .collect::<Vec<String>>()
        .join(" or ")
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InappropriateMessage {
                expect_types,
                got_type,
            } => write!(
                f,
                "received unexpected message: got {:?} when expecting {}",
                got_type,
                join::<ContentType>(expect_types)
            ),
            Self::InappropriateHandshakeMessage {
                expect_types,
                got_type,
            } => write!(
                f,
                "received unexpected handshake message: got {:?} when expecting {}",
                got_type,
                join::<HandshakeType>(expect_types)
            ),
            Self::InvalidMessage(typ) => {
                write!(f, "received corrupt message of type {:?}", typ)
            }
            Self::PeerIncompatible(why) => write!(f, "peer is incompatible: {:?}", why),
            Self::PeerMisbehaved(why) => write!(f, "peer misbehaved: {:?}", why),
            Self::AlertReceived(alert) => write!(f, "received fatal alert: {:?}", alert),
            Self::DecryptError => write!(f, "cannot decrypt peer's message"),
            Self::FinishedMismatch => write!(f, "peer's Finished message did not verify"),
            Self::EncryptError => write!(f, "cannot encrypt message"),
            Self::PeerSentOversizedRecord => write!(f, "peer sent excess record size"),
            Self::HandshakeNotComplete => write!(f, "handshake not complete"),
            Self::ConcurrentOperation => {
                write!(f, "another operation of this kind is already in progress")
            }
            Self::ConnectionClosed => write!(f, "connection is closed"),
            Self::FailedToGetRandomBytes => write!(f, "failed to get random bytes"),
            Self::BadMaxFragmentSize => {
                write!(f, "the supplied max_fragment_size was too small or large")
            }
            Self::General(err) => write!(f, "unexpected error: {}", err),
            Self::Io(err) => write!(f, "transport error: {}", err),
        }
    }
}

impl StdError for Error {}

impl From<GetRandomFailed> for Error {
    fn from(_: GetRandomFailed) -> Self {
        Self::FailedToGetRandomBytes
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::{Error, InvalidMessage, IoError, PeerIncompatible, PeerMisbehaved};
    use crate::enums::{AlertDescription, ContentType, HandshakeType};

    #[test]
    fn smoke() {
        let all = vec![
            Error::InappropriateMessage {
                expect_types: vec![ContentType::Alert],
                got_type: ContentType::Handshake,
            },
            Error::InappropriateHandshakeMessage {
                expect_types: vec![HandshakeType::ClientHello, HandshakeType::Finished],
                got_type: HandshakeType::ServerHello,
            },
            Error::InvalidMessage(InvalidMessage::InvalidCcs),
            Error::DecryptError,
            Error::FinishedMismatch,
            PeerIncompatible::NoCipherSuitesInCommon.into(),
            PeerMisbehaved::HandshakeMessageTooLarge.into(),
            Error::AlertReceived(AlertDescription::ExportRestriction),
            Error::General("undocumented error".to_string()),
            Error::FailedToGetRandomBytes,
            Error::HandshakeNotComplete,
            Error::PeerSentOversizedRecord,
            Error::ConcurrentOperation,
            Error::ConnectionClosed,
            Error::BadMaxFragmentSize,
            Error::Io(io::ErrorKind::ConnectionReset.into()),
        ];

        for err in all {
            println!("{:?}:", err);
            println!("  fmt '{}'", err);
        }
    }

    #[test]
    fn alert_mapping() {
        assert_eq!(
            Error::InappropriateHandshakeMessage {
                expect_types: vec![HandshakeType::ClientHello],
                got_type: HandshakeType::Finished,
            }
            .alert(),
            Some(AlertDescription::UnexpectedMessage)
        );
        assert_eq!(
            Error::from(InvalidMessage::MessageTooShort).alert(),
            Some(AlertDescription::DecodeError)
        );
        assert_eq!(
            Error::DecryptError.alert(),
            Some(AlertDescription::BadRecordMac)
        );
        assert_eq!(
            Error::FinishedMismatch.alert(),
            Some(AlertDescription::DecryptError)
        );
        assert_eq!(
            Error::from(PeerIncompatible::ProtocolVersionTooLow).alert(),
            Some(AlertDescription::ProtocolVersion)
        );
        assert_eq!(
            Error::from(PeerIncompatible::NoCipherSuitesInCommon).alert(),
            Some(AlertDescription::HandshakeFailure)
        );
        assert_eq!(
            Error::PeerSentOversizedRecord.alert(),
            Some(AlertDescription::RecordOverflow)
        );
        assert_eq!(
            Error::General("x".into()).alert(),
            Some(AlertDescription::InternalError)
        );
        assert_eq!(
            Error::AlertReceived(AlertDescription::HandshakeFailure).alert(),
            None
        );
        assert_eq!(Error::Io(io::ErrorKind::BrokenPipe.into()).alert(), None);
    }

    #[test]
    fn io_errors_compare_by_kind() {
        let a: IoError = io::Error::new(io::ErrorKind::UnexpectedEof, "one").into();
        let b: IoError = io::Error::new(io::ErrorKind::UnexpectedEof, "two").into();
        let c: IoError = io::ErrorKind::ConnectionReset.into();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn conversion_to_io_error() {
        let e: io::Error = Error::DecryptError.into();
        assert_eq!(e.kind(), io::ErrorKind::InvalidData);

        let e: io::Error = Error::Io(io::ErrorKind::ConnectionAborted.into()).into();
        assert_eq!(e.kind(), io::ErrorKind::ConnectionAborted);

        let e: io::Error = Error::ConnectionClosed.into();
        assert_eq!(e.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn rand_error_mapping() {
        use super::GetRandomFailed;
        let err: Error = GetRandomFailed.into();
        assert_eq!(err, Error::FailedToGetRandomBytes);
    }
}
