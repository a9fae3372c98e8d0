//! # tlsfilter - a server-side TLS 1.0-1.2 filter
//!
//! tlsfilter turns a plain bidirectional byte stream, such as an accepted
//! TCP connection, into an authenticated and encrypted channel speaking the
//! TLS 1.0, 1.1 and 1.2 wire protocols.  It only ever plays the server role.
//!
//! It is meant for deployments that hold their certificate and private key
//! directly (for example, certificates issued programmatically at runtime)
//! and want full control over the handshake rather than linking a complete
//! general-purpose TLS library.
//!
//! ## Scope
//!
//! * Key exchange: RSA only.  The client encrypts the premaster secret to the
//!   public key in our leaf certificate.
//! * Record protection: CBC mode with HMAC, in the five cipher suites
//!   `TLS_RSA_WITH_AES_256_CBC_SHA256`, `TLS_RSA_WITH_AES_256_CBC_SHA`,
//!   `TLS_RSA_WITH_AES_128_CBC_SHA256`, `TLS_RSA_WITH_AES_128_CBC_SHA` and
//!   `TLS_RSA_WITH_3DES_EDE_CBC_SHA`, preferred in that order.
//! * No certificate validation, client authentication, resumption,
//!   renegotiation, compression, ECDHE/DHE or TLS 1.3.
//!
//! ## Design overview
//!
//! The protocol engine is [`ServerConnection`]: a sans-IO object you feed
//! received bytes into ([`ServerConnection::read_tls`] then
//! [`ServerConnection::process_new_packets`]) and take bytes to send out of
//! ([`ServerConnection::write_tls`]).  It never performs IO itself.
//!
//! Two facades drive it over a transport:
//!
//! * [`Connection`] for blocking transports implementing [`Transport`]
//!   (such as [`std::net::TcpStream`]).  Its methods take `&self`, so one
//!   thread may read while another writes.
//! * [`AsyncConnection`] for transports implementing the `futures`
//!   `AsyncRead` and `AsyncWrite` traits.
//!
//! Both run only on the threads or tasks of their callers; no threads are
//! spawned.  Control records (alerts, handshake continuation) are processed
//! transparently by whichever call is currently reading.
//!
//! ## Getting started
//!
//! ```no_run
//! use std::io::{Read, Write};
//! use std::net::TcpListener;
//! use std::sync::Arc;
//!
//! use tlsfilter::pki_types::{CertificateDer, PrivateKeyDer};
//! use tlsfilter::{Connection, ServerConfig};
//!
//! # fn load() -> (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>) { unimplemented!() }
//! let (certs, key) = load();
//! let config = Arc::new(ServerConfig::new(certs, key).unwrap());
//!
//! let listener = TcpListener::bind("0.0.0.0:4443").unwrap();
//! let (sock, _) = listener.accept().unwrap();
//! let conn = Connection::new(sock);
//! conn.authenticate_as_server(config).unwrap();
//!
//! let mut buf = [0u8; 1024];
//! let n = (&conn).read(&mut buf).unwrap();
//! (&conn).write_all(&buf[..n]).unwrap();
//! conn.close();
//! ```
//!
//! ## Crate features
//!
//! - `logging` (enabled by default): makes the crate emit log messages via
//!   the `log` crate.

#![forbid(unsafe_code, unused_must_use)]
#![warn(missing_docs, clippy::alloc_instead_of_core, clippy::manual_let_else)]

// log for logging (optional).
#[cfg(feature = "logging")]
use log;

#[cfg(not(feature = "logging"))]
#[macro_use]
mod log {
    macro_rules! trace    ( ($($tt:tt)*) => {{}} );
    macro_rules! debug    ( ($($tt:tt)*) => {{}} );
    macro_rules! warn     ( ($($tt:tt)*) => {{}} );
}

#[macro_use]
mod msgs;
mod async_stream;
#[macro_use]
mod check;
mod common_state;
mod conn;
pub mod crypto;
mod enums;
mod error;
mod hash_hs;
mod key_log;
mod key_log_file;
mod record_layer;
mod stream;
mod suites;
mod tls12;
mod vecbuf;
mod versions;

/// Items for use in a server.
pub mod server;

/// Internal classes that are used in integration tests.
/// The contents of this section DO NOT form part of the stable interface.
#[doc(hidden)]
pub mod internal {
    /// Low-level TLS message parsing and encoding functions.
    pub mod msgs {
        pub use crate::msgs::*;
    }
    /// Record protection and sequence numbering.
    pub mod record_layer {
        pub use crate::record_layer::RecordLayer;
    }
    /// Key derivation for the TLS 1.0-1.2 key schedule.
    pub mod tls12 {
        pub use crate::tls12::{ConnectionRandoms, ConnectionSecrets};
    }
    /// Handshake transcript hashing.
    pub mod hash_hs {
        pub use crate::hash_hs::HandshakeTranscript;
    }
    pub use crate::common_state::Side;
}

// The public interface is:
pub use crate::async_stream::AsyncConnection;
pub use crate::conn::{ConnectionState, IoState, ServerConnection};
pub use crate::enums::{AlertDescription, CipherSuite, ContentType, HandshakeType, ProtocolVersion};
pub use crate::error::{Error, InvalidMessage, IoError, PeerIncompatible, PeerMisbehaved};
pub use crate::key_log::{KeyLog, NoKeyLog};
pub use crate::key_log_file::KeyLogFile;
pub use crate::msgs::enums::AlertLevel;
pub use crate::server::ServerConfig;
pub use crate::stream::{Connection, Transport};
pub use crate::suites::{CipherSuiteCommon, Tls12CipherSuite};
pub use crate::versions::{SupportedProtocolVersion, ALL_VERSIONS};

/// All defined protocol versions appear in this module.
///
/// ALL_VERSIONS is provided as an array of all of these values.
pub mod version {
    pub use crate::versions::{TLS10, TLS11, TLS12};
}

/// Re-exports the contents of the [rustls-pki-types](https://docs.rs/rustls-pki-types) crate
/// for easy access.
pub mod pki_types {
    pub use pki_types::*;
}
