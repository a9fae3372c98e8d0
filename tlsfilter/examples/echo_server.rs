//! A TLS echo server: it accepts connections, completes the handshake and
//! sends every byte it receives straight back.
//!
//! Usage: cargo run --example echo_server <cert.pem> <key.pem> [port]
//!
//! Set `RUST_LOG=debug` to watch handshakes, and `SSLKEYLOGFILE` to record
//! session keys for Wireshark.
//!
//! Note that `unwrap()` is used to deal with configuration errors; this is
//! not something that is sensible outside of example code.

use std::error::Error as StdError;
use std::fs::File;
use std::io::BufReader;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::{env, thread};

use tlsfilter::pki_types::CertificateDer;
use tlsfilter::{Connection, KeyLogFile, ServerConfig};

fn load_config(cert_file: &str, key_file: &str) -> Result<ServerConfig, Box<dyn StdError>> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(File::open(cert_file)?))
        .collect::<Result<Vec<CertificateDer<'static>>, _>>()?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(File::open(key_file)?))?
        .ok_or("no private key found")?;

    let mut config = ServerConfig::new(certs, key)?;
    config.key_log = Arc::new(KeyLogFile::new());
    Ok(config)
}

fn serve(stream: TcpStream, config: Arc<ServerConfig>) -> Result<(), tlsfilter::Error> {
    let conn = Connection::new(stream);
    conn.authenticate_as_server(config)?;
    log::info!(
        "handshake done: {:?} {:?}",
        conn.negotiated_version(),
        conn.negotiated_cipher_suite()
            .map(|cs| cs.suite())
    );

    let mut buf = [0u8; 4096];
    loop {
        let n = conn.read(&mut buf)?;
        if n == 0 {
            break;
        }
        conn.write(&buf[..n])?;
    }

    conn.close();
    Ok(())
}

fn main() -> Result<(), Box<dyn StdError>> {
    env_logger::init();

    let mut args = env::args().skip(1);
    let cert_file = args
        .next()
        .expect("missing certificate file argument");
    let key_file = args
        .next()
        .expect("missing private key file argument");
    let port = args
        .next()
        .map(|p| p.parse::<u16>())
        .transpose()?
        .unwrap_or(4443);

    let config = Arc::new(load_config(&cert_file, &key_file)?);
    let listener = TcpListener::bind(("0.0.0.0", port))?;
    println!("listening on port {}", port);

    for stream in listener.incoming() {
        let stream = stream?;
        let peer = stream.peer_addr()?;
        let config = config.clone();
        thread::spawn(move || {
            if let Err(err) = serve(stream, config) {
                log::warn!("{}: {}", peer, err);
            }
        });
    }

    Ok(())
}
