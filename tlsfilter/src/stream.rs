use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::conn::{ConnectionState, ServerConnection};
use crate::enums::ProtocolVersion;
use crate::error::Error;
#[cfg(feature = "logging")]
use crate::log::{debug, warn};
use crate::msgs::message::MAX_WIRE_SIZE;
use crate::server::ServerConfig;
use crate::suites::Tls12CipherSuite;

/// A duplex byte channel usable from several threads at once.
///
/// Methods take `&self` so that one thread may block in `read` while
/// another writes, as `&TcpStream` allows.
pub trait Transport: Send + Sync {
    /// Read some bytes, blocking until at least one is available.
    /// `Ok(0)` means end of stream.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write some bytes, returning how many were taken.
    fn write(&self, buf: &[u8]) -> io::Result<usize>;

    /// Flush any buffered output.
    fn flush(&self) -> io::Result<()>;

    /// Close both directions.  Blocked reads should return promptly.
    fn shutdown(&self) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut sock: &Self = self;
        Read::read(&mut sock, buf)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut sock: &Self = self;
        Write::write(&mut sock, buf)
    }

    fn flush(&self) -> io::Result<()> {
        let mut sock: &Self = self;
        Write::flush(&mut sock)
    }

    fn shutdown(&self) -> io::Result<()> {
        Self::shutdown(self, Shutdown::Both)
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }

    fn flush(&self) -> io::Result<()> {
        (**self).flush()
    }

    fn shutdown(&self) -> io::Result<()> {
        (**self).shutdown()
    }
}

/// Marks one direction of a connection as busy for the lifetime of
/// the guard.
pub(crate) struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    pub(crate) fn enter(flag: &'a AtomicBool) -> Result<Self, Error> {
        if flag.swap(true, Ordering::Acquire) {
            return Err(Error::ConcurrentOperation);
        }
        Ok(Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Connection state shared by every caller of a facade.
pub(crate) struct Core {
    pub(crate) engine: Option<ServerConnection>,
    pub(crate) closed: bool,
    /// A transport failure.  Protocol failures live in the engine.
    pub(crate) error: Option<Error>,
}

impl Core {
    pub(crate) fn new() -> Self {
        Self {
            engine: None,
            closed: false,
            error: None,
        }
    }

    /// Record a transport failure, keeping the first.
    pub(crate) fn set_error(&mut self, err: Error) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    pub(crate) fn failure(&self) -> Option<Error> {
        self.error.clone().or_else(|| {
            self.engine
                .as_ref()
                .and_then(|engine| engine.error().cloned())
        })
    }

    pub(crate) fn state(&self) -> ConnectionState {
        if self.closed {
            return ConnectionState::Closed;
        }
        if self.error.is_some() {
            return ConnectionState::Error;
        }
        match &self.engine {
            Some(engine) => engine.state(),
            None => ConnectionState::Unauthenticated,
        }
    }

    /// Start the handshake with `engine`.
    pub(crate) fn install(&mut self, engine: ServerConnection) -> Result<(), Error> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        if self.engine.is_some() {
            return Err(Error::General("connection already authenticating".into()));
        }
        self.engine = Some(engine);
        Ok(())
    }

    /// How a pending `authenticate_as_server` call should finish, if it
    /// should finish now.
    pub(crate) fn handshake_outcome(&self) -> Option<Result<(), Error>> {
        if let Some(err) = self.failure() {
            return Some(Err(err));
        }
        match self.state() {
            ConnectionState::Authenticated => Some(Ok(())),
            ConnectionState::Closed => Some(Err(Error::ConnectionClosed)),
            _ => None,
        }
    }

    /// Take plaintext out for a pending read, or say how the read
    /// should finish, if it should finish now.
    pub(crate) fn read_outcome(&mut self, buf: &mut [u8]) -> Option<Result<usize, Error>> {
        if self.closed {
            return Some(Ok(0));
        }

        if let Some(engine) = self.engine.as_mut() {
            if engine.has_plaintext() || buf.is_empty() {
                return Some(
                    engine
                        .reader()
                        .read(buf)
                        .map_err(Error::from),
                );
            }
        }

        if let Some(err) = self.failure() {
            return Some(Err(err));
        }

        match &self.engine {
            Some(engine)
                if engine.peer_has_closed()
                    || (engine.has_seen_eof() && !engine.is_handshaking()) =>
            {
                Some(Ok(0))
            }
            _ => None,
        }
    }

    /// Encrypt `data` for sending, or fail if the connection cannot
    /// carry application data.
    pub(crate) fn send(&mut self, data: &[u8]) -> Result<usize, Error> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        if let Some(err) = self.failure() {
            return Err(err);
        }
        match self.engine.as_mut() {
            Some(engine) if !engine.is_handshaking() => engine.send_plaintext(data),
            _ => Err(Error::HandshakeNotComplete),
        }
    }

    /// Feed bytes received from the transport to the engine.  An empty
    /// `data` means the transport reached EOF.
    pub(crate) fn receive(&mut self, mut data: &[u8]) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };

        loop {
            let eof = data.is_empty();
            if let Err(err) = engine.read_tls(&mut data) {
                self.error = Some(err.into());
                return;
            }

            if engine.process_new_packets().is_err()
                || engine.peer_has_closed()
                || eof
                || data.is_empty()
            {
                return;
            }
        }
    }

    /// Everything queued for the transport.
    pub(crate) fn take_output(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        if let Some(engine) = self.engine.as_mut() {
            engine.drain_tls(&mut out);
        }
        out
    }

    /// Queue close_notify if the handshake completed, and mark the
    /// connection closed.  Returns false if it already was.
    pub(crate) fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;

        if let Some(engine) = self.engine.as_mut() {
            if !engine.is_handshaking() && engine.error().is_none() {
                engine.send_close_notify();
            }
        }
        true
    }

    pub(crate) fn negotiated_version(&self) -> Option<ProtocolVersion> {
        self.engine
            .as_ref()
            .and_then(ServerConnection::negotiated_version)
    }

    pub(crate) fn negotiated_cipher_suite(&self) -> Option<&'static Tls12CipherSuite> {
        self.engine
            .as_ref()
            .and_then(ServerConnection::negotiated_cipher_suite)
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// A TLS server connection over a blocking [`Transport`].
///
/// All methods take `&self`: share the connection between threads with an
/// `Arc`, or scoped borrows.  At most one read and one write may be
/// outstanding at any time; a second concurrent call of either kind fails
/// with [`Error::ConcurrentOperation`].
///
/// No threads are spawned.  Whichever call needs bytes from the transport
/// reads them and processes every record they contain, including alerts
/// and handshake messages; other callers wait for it to finish.
pub struct Connection<T: Transport> {
    transport: T,
    core: Mutex<Core>,
    changed: Condvar,
    /// Held while records are moved from the engine to the transport, so
    /// they go out in sequence number order.  Taken before `core`.
    write_lock: Mutex<()>,
    /// Set while some thread is blocked reading the transport.
    pumping: AtomicBool,
    reading: AtomicBool,
    writing: AtomicBool,
}

impl<T: Transport> Connection<T> {
    /// Wrap an open transport.  This does no IO.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            core: Mutex::new(Core::new()),
            changed: Condvar::new(),
            write_lock: Mutex::new(()),
            pumping: AtomicBool::new(false),
            reading: AtomicBool::new(false),
            writing: AtomicBool::new(false),
        }
    }

    /// Run the server handshake using `config`, returning once the
    /// connection is [`ConnectionState::Authenticated`] or has failed.
    pub fn authenticate_as_server(&self, config: Arc<ServerConfig>) -> Result<(), Error> {
        let engine = ServerConnection::new(config)?;

        let mut core = lock(&self.core);
        core.install(engine)?;
        debug!("starting server handshake");
        self.changed.notify_all();

        loop {
            if let Some(outcome) = core.handshake_outcome() {
                return outcome;
            }
            core = self.make_progress(core);
        }
    }

    /// Read decrypted application data into `buf`.
    ///
    /// Blocks until some is available.  Returns `Ok(0)` once the peer has
    /// closed the connection, or after [`Connection::close`].  This may be
    /// called before the handshake is started; it then waits for it.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, Error> {
        let _in_flight = InFlight::enter(&self.reading)?;

        let mut core = lock(&self.core);
        loop {
            if let Some(outcome) = core.read_outcome(buf) {
                return outcome;
            }

            core = if core.engine.is_some() {
                self.make_progress(core)
            } else {
                self.changed
                    .wait(core)
                    .unwrap_or_else(PoisonError::into_inner)
            };
        }
    }

    /// Encrypt and send all of `buf` as application data.
    ///
    /// Fails with [`Error::HandshakeNotComplete`] before the handshake has
    /// completed.
    pub fn write(&self, buf: &[u8]) -> Result<usize, Error> {
        let _in_flight = InFlight::enter(&self.writing)?;

        let _write_lock = lock(&self.write_lock);
        let (sent, output) = {
            let mut core = lock(&self.core);
            let sent = core.send(buf)?;
            (sent, core.take_output())
        };

        if let Err(err) = self.send_to_transport(&output) {
            lock(&self.core).set_error(err.clone());
            return Err(err);
        }
        Ok(sent)
    }

    /// Send close_notify if the handshake completed, then shut down the
    /// transport.  Blocked calls return; later reads return `Ok(0)` and
    /// later writes fail with [`Error::ConnectionClosed`].
    ///
    /// Calling this more than once is harmless.
    pub fn close(&self) {
        let _write_lock = lock(&self.write_lock);
        let output = {
            let mut core = lock(&self.core);
            if !core.close() {
                return;
            }
            self.changed.notify_all();
            core.take_output()
        };

        debug!("closing connection");
        let _ = self.send_to_transport(&output);
        let _ = self.transport.shutdown();
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

    /// Read the transport once and process what arrived, or wait for the
    /// thread already doing so.
    fn make_progress<'a>(&'a self, core: MutexGuard<'a, Core>) -> MutexGuard<'a, Core> {
        if self.pumping.swap(true, Ordering::AcqRel) {
            return self
                .changed
                .wait(core)
                .unwrap_or_else(PoisonError::into_inner);
        }
        drop(core);

        let mut buf = vec![0u8; MAX_WIRE_SIZE];
        let received = loop {
            match self.transport.read(&mut buf) {
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                result => break result,
            }
        };

        {
            let mut core = lock(&self.core);
            match received {
                Ok(n) => core.receive(&buf[..n]),
                Err(err) => {
                    if !core.closed {
                        warn!("transport read failed: {}", err);
                    }
                    core.set_error(err.into());
                }
            }
        }

        self.flush_output();

        let core = lock(&self.core);
        self.pumping.store(false, Ordering::Release);
        self.changed.notify_all();
        core
    }

    /// Send whatever processing the last records queued: handshake
    /// replies, alerts.
    fn flush_output(&self) {
        let _write_lock = lock(&self.write_lock);
        let output = lock(&self.core).take_output();
        if let Err(err) = self.send_to_transport(&output) {
            lock(&self.core).set_error(err);
        }
    }

    /// Write all of `data`.  The caller holds `write_lock`.
    fn send_to_transport(&self, mut data: &[u8]) -> Result<(), Error> {
        if data.is_empty() {
            return Ok(());
        }

        while !data.is_empty() {
            match self.transport.write(data) {
                Ok(0) => return Err(Error::Io(io::ErrorKind::WriteZero.into())),
                Ok(n) => data = &data[n..],
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }

        Ok(self.transport.flush()?)
    }
}

impl<T: Transport> io::Read for &Connection<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(Connection::read(self, buf)?)
    }
}

impl<T: Transport> io::Write for &Connection<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(Connection::write(self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
