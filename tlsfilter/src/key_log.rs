use core::fmt::Debug;

/// Label under which the TLS 1.0-1.2 master secret is logged.
pub(crate) const CLIENT_RANDOM: &str = "CLIENT_RANDOM";

/// This trait represents the ability to do something useful
/// with key material, such as logging it to a file for debugging.
///
/// Naturally, secrets passed over the interface are *extremely*
/// sensitive and can break the security of past, present and
/// future sessions.
///
/// You'll likely want some interior mutability in your
/// implementation to make this useful.
///
/// See [`crate::KeyLogFile`] that implements the standard
/// `SSLKEYLOGFILE` environment variable behaviour.
pub trait KeyLog: Debug + Send + Sync {
    /// Log the given `secret`.  `client_random` is provided for
    /// session identification.  `label` describes precisely what
    /// `secret` means.
    ///
    /// The only label this crate emits is `CLIENT_RANDOM`, where `secret`
    /// is the 48-byte master secret of the connection.  It is offered once
    /// per connection, as soon as the ClientKeyExchange is processed.
    ///
    /// This matches the NSS key log format:
    /// <https://nss-crypto.org/reference/security/nss/legacy/key_log_format/index.html>
    fn log(&self, label: &str, client_random: &[u8], secret: &[u8]);

    /// Indicates whether the secret with label `label` will be logged.
    ///
    /// If `will_log` returns true then `log` will be called with the secret.
    /// Otherwise, `log` will not be called for the secret.
    fn will_log(&self, _label: &str) -> bool {
        true
    }
}

/// KeyLog that does exactly nothing.
#[derive(Debug)]
pub struct NoKeyLog;

impl KeyLog for NoKeyLog {
    fn log(&self, _: &str, _: &[u8], _: &[u8]) {}
    #[inline]
    fn will_log(&self, _label: &str) -> bool {
        false
    }
}
