use core::fmt::{Debug, Formatter, Write as _};
use std::env::var_os;
use std::fs::{File, OpenOptions};
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

#[cfg(feature = "logging")]
use crate::log::warn;
use crate::KeyLog;

struct KeyLogFileInner {
    file: Option<File>,
}

impl KeyLogFileInner {
    fn open(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self { file: None };
        };

        #[cfg_attr(not(feature = "logging"), allow(unused_variables))]
        let file = match OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
        {
            Ok(f) => Some(f),
            Err(e) => {
                warn!("unable to create key log file {:?}: {}", path, e);
                None
            }
        };

        Self { file }
    }

    fn try_write(&mut self, label: &str, client_random: &[u8], secret: &[u8]) -> io::Result<()> {
        let Some(file) = &mut self.file else {
            return Ok(());
        };

        file.write_all(format_line(label, client_random, secret).as_bytes())
    }
}

/// One NSS key log line: `<label> <client_random hex> <secret hex>\n`.
fn format_line(label: &str, client_random: &[u8], secret: &[u8]) -> String {
    let mut line = String::with_capacity(label.len() + 2 * (client_random.len() + secret.len()) + 3);
    line.push_str(label);
    line.push(' ');
    for b in client_random {
        let _ = write!(line, "{:02x}", b);
    }
    line.push(' ');
    for b in secret {
        let _ = write!(line, "{:02x}", b);
    }
    line.push('\n');
    line
}

/// [`KeyLog`] implementation that opens a file whose name is
/// given by the `SSLKEYLOGFILE` environment variable, and writes
/// keys into it.
///
/// If `SSLKEYLOGFILE` is not set, this does nothing.
///
/// If such a file cannot be opened, or cannot be written then
/// this does nothing but logs errors at warning-level.
pub struct KeyLogFile(Mutex<KeyLogFileInner>);

impl KeyLogFile {
    /// Makes a new `KeyLogFile`.  The environment variable is
    /// inspected and the named file is opened during this call.
    pub fn new() -> Self {
        let var = var_os("SSLKEYLOGFILE");
        Self::with_path(var.as_deref().map(Path::new))
    }

    /// Makes a `KeyLogFile` appending to `path`, or doing nothing for `None`.
    pub fn with_path(path: Option<&Path>) -> Self {
        Self(Mutex::new(KeyLogFileInner::open(path)))
    }
}

impl Default for KeyLogFile {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyLog for KeyLogFile {
    fn log(&self, label: &str, client_random: &[u8], secret: &[u8]) {
        let mut inner = match self.0.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };

        #[cfg_attr(not(feature = "logging"), allow(unused_variables))]
        match inner.try_write(label, client_random, secret) {
            Ok(()) => {}
            Err(e) => {
                warn!("error writing to key log file: {}", e);
            }
        }
    }

    fn will_log(&self, _label: &str) -> bool {
        self.0
            .lock()
            .map(|inner| inner.file.is_some())
            .unwrap_or(false)
    }
}

impl Debug for KeyLogFile {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self.0.try_lock() {
            Ok(inner) => f
                .debug_struct("KeyLogFile")
                .field("file", &inner.file)
                .finish(),
            Err(_) => write!(f, "KeyLogFile {{ <locked> }}"),
        }
    }
}
