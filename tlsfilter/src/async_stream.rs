use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use futures::lock::Mutex as AsyncMutex;

use crate::conn::{ConnectionState, ServerConnection};
use crate::enums::ProtocolVersion;
use crate::error::Error;
#[cfg(feature = "logging")]
use crate::log::{debug, trace, warn};
use crate::msgs::message::MAX_WIRE_SIZE;
use crate::server::ServerConfig;
use crate::stream::{lock, Core, InFlight};
use crate::suites::Tls12CipherSuite;

/// A TLS server connection over a `futures` [`AsyncRead`] + [`AsyncWrite`]
/// transport.
///
/// This behaves like [`crate::Connection`]: methods take `&self`, at most
/// one read and one write may be outstanding, and whichever task reads the
/// transport processes every record it carries.  It is executor-agnostic.
///
/// Unlike [`crate::Connection`], reading before
/// [`AsyncConnection::authenticate_as_server`] has been called fails with
/// [`Error::HandshakeNotComplete`] instead of waiting.
pub struct AsyncConnection<T> {
    reader: AsyncMutex<ReadHalf<T>>,
    writer: AsyncMutex<WriteHalf<T>>,
    core: Mutex<Core>,
    /// Bumped each time received bytes have been processed.
    progress: AtomicU64,
    reading: AtomicBool,
    writing: AtomicBool,
}

impl<T> AsyncConnection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an open transport.  This does no IO.
    pub fn new(transport: T) -> Self {
        let (reader, writer) = transport.split();
        Self {
            reader: AsyncMutex::new(reader),
            writer: AsyncMutex::new(writer),
            core: Mutex::new(Core::new()),
            progress: AtomicU64::new(0),
            reading: AtomicBool::new(false),
            writing: AtomicBool::new(false),
        }
    }

    /// Run the server handshake using `config`, completing once the
    /// connection is [`ConnectionState::Authenticated`] or has failed.
    pub async fn authenticate_as_server(&self, config: Arc<ServerConfig>) -> Result<(), Error> {
        let engine = ServerConnection::new(config)?;
        lock(&self.core).install(engine)?;
        debug!("starting server handshake");

        loop {
            let outcome = lock(&self.core).handshake_outcome();
            if let Some(outcome) = outcome {
                return outcome;
            }
            self.make_progress().await;
        }
    }

    /// Read decrypted application data into `buf`.
    ///
    /// Completes once some is available, with `Ok(0)` once the peer has
    /// closed the connection or after [`AsyncConnection::close`].
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, Error> {
        let _in_flight = InFlight::enter(&self.reading)?;

        loop {
            let outcome = {
                let mut core = lock(&self.core);
                if core.engine.is_none() && !core.closed {
                    return Err(Error::HandshakeNotComplete);
                }
                core.read_outcome(buf)
            };

            if let Some(outcome) = outcome {
                return outcome;
            }
            self.make_progress().await;
        }
    }

    /// Encrypt and send all of `buf` as application data.
    ///
    /// Fails with [`Error::HandshakeNotComplete`] before the handshake has
    /// completed.
    pub async fn write(&self, buf: &[u8]) -> Result<usize, Error> {
        let _in_flight = InFlight::enter(&self.writing)?;

        let mut writer = self.writer.lock().await;
        let (sent, output) = {
            let mut core = lock(&self.core);
            let sent = core.send(buf)?;
            (sent, core.take_output())
        };

        if let Err(err) = send_to(&mut *writer, &output).await {
            lock(&self.core).set_error(err.clone());
            return Err(err);
        }
        Ok(sent)
    }

    /// Send close_notify if the handshake completed, then close the
    /// transport.  Later reads return `Ok(0)` and later writes fail with
    /// [`Error::ConnectionClosed`].
    ///
    /// Calling this more than once is harmless.
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let output = {
            let mut core = lock(&self.core);
            if !core.close() {
                return;
            }
            core.take_output()
        };

        debug!("closing connection");
        let _ = send_to(&mut *writer, &output).await;
        let _ = writer.close().await;
    }

    /// Where this connection is in its lifecycle.
    pub fn state(&self) -> ConnectionState {
        lock(&self.core).state()
    }

    /// The protocol version chosen by the handshake, once known.
    pub fn negotiated_version(&self) -> Option<ProtocolVersion> {
        lock(&self.core).negotiated_version()
    }

    /// The cipher suite chosen by the handshake, once known.
    pub fn negotiated_cipher_suite(&self) -> Option<&'static Tls12CipherSuite> {
        lock(&self.core).negotiated_cipher_suite()
    }

    /// Read the transport once and process what arrived.  If another
    /// task did that while we waited for the reader, return at once.
    async fn make_progress(&self) {
        let seen = self.progress.load(Ordering::Acquire);
        let mut reader = self.reader.lock().await;
        if self.progress.load(Ordering::Acquire) != seen {
            return;
        }

        let mut buf = vec![0u8; MAX_WIRE_SIZE];
        let received = loop {
            match reader.read(&mut buf).await {
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                result => break result,
            }
        };

        {
            let mut core = lock(&self.core);
            match received {
                Ok(n) => {
                    trace!("received {} bytes", n);
                    core.receive(&buf[..n]);
                }
                Err(err) => {
                    if !core.closed {
                        warn!("transport read failed: {}", err);
                    }
                    core.set_error(err.into());
                }
            }
        }
        self.progress
            .fetch_add(1, Ordering::AcqRel);
        drop(reader);

        self.flush_output().await;
    }

    async fn flush_output(&self) {
        let mut writer = self.writer.lock().await;
        let output = lock(&self.core).take_output();
        if let Err(err) = send_to(&mut *writer, &output).await {
            lock(&self.core).set_error(err);
        }
    }
}

async fn send_to<W>(writer: &mut W, data: &[u8]) -> Result<(), Error>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    if data.is_empty() {
        return Ok(());
    }
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}
