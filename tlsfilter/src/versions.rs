use crate::enums::ProtocolVersion;

/// How CBC records carry their initialisation vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IvMode {
    /// TLS 1.0: the last ciphertext block of the previous record is the IV
    /// of the next one.
    Chained,
    /// TLS 1.1 and later: each record starts with a fresh random IV.
    Explicit,
}

/// Which hash(es) the handshake transcript is computed with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TranscriptKind {
    /// `MD5(messages) || SHA1(messages)`.
    Md5Sha1,
    /// The cipher suite's hash, SHA-256 for every supported suite.
    SuiteHash,
}

/// Which PRF derives keys and Finished values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrfKind {
    /// `P_MD5 XOR P_SHA1` over split secret halves.
    Md5Sha1,
    /// `P_hash` with the suite's PRF HMAC.
    SuiteHash,
}

/// A TLS protocol version supported by tlsfilter.
///
/// All possible instances of this class are provided by the library in
/// the [`ALL_VERSIONS`] array, as well as individually as [`TLS10`],
/// [`TLS11`] and [`TLS12`].  Each carries the per-version choices the record
/// layer and key schedule make.
#[derive(Debug, PartialEq)]
pub struct SupportedProtocolVersion {
    /// The TLS enumeration naming this version.
    pub version: ProtocolVersion,
    pub(crate) iv_mode: IvMode,
    pub(crate) transcript: TranscriptKind,
    pub(crate) prf: PrfKind,
}

/// TLS1.0
pub static TLS10: SupportedProtocolVersion = SupportedProtocolVersion {
    version: ProtocolVersion::TLSv1_0,
    iv_mode: IvMode::Chained,
    transcript: TranscriptKind::Md5Sha1,
    prf: PrfKind::Md5Sha1,
};

/// TLS1.1
pub static TLS11: SupportedProtocolVersion = SupportedProtocolVersion {
    version: ProtocolVersion::TLSv1_1,
    iv_mode: IvMode::Explicit,
    transcript: TranscriptKind::Md5Sha1,
    prf: PrfKind::Md5Sha1,
};

/// TLS1.2
pub static TLS12: SupportedProtocolVersion = SupportedProtocolVersion {
    version: ProtocolVersion::TLSv1_2,
    iv_mode: IvMode::Explicit,
    transcript: TranscriptKind::SuiteHash,
    prf: PrfKind::SuiteHash,
};

/// A list of all the protocol versions supported by tlsfilter, highest first.
pub static ALL_VERSIONS: &[&SupportedProtocolVersion] = &[&TLS12, &TLS11, &TLS10];

/// Find the entry for `version` among `enabled`.
pub(crate) fn lookup(
    enabled: &[&'static SupportedProtocolVersion],
    version: ProtocolVersion,
) -> Option<&'static SupportedProtocolVersion> {
    enabled
        .iter()
        .find(|v| v.version == version)
        .copied()
}

/// Clamp the client's offered version to the highest we have enabled.
///
/// Returns `None` when the result is older than TLS 1.0, or is a version we
/// have disabled.
pub(crate) fn negotiate(
    enabled: &[&'static SupportedProtocolVersion],
    client_version: ProtocolVersion,
) -> Option<&'static SupportedProtocolVersion> {
    let ceiling = enabled
        .iter()
        .map(|v| v.version.get_u16())
        .max()?;
    let chosen = client_version.get_u16().min(ceiling);
    if chosen < ProtocolVersion::TLSv1_0.get_u16() {
        return None;
    }
    lookup(enabled, ProtocolVersion::from(chosen))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_to_highest_enabled() {
        assert_eq!(
            negotiate(ALL_VERSIONS, ProtocolVersion::TLSv1_2),
            Some(&TLS12)
        );
        assert_eq!(
            negotiate(ALL_VERSIONS, ProtocolVersion::TLSv1_3),
            Some(&TLS12)
        );
        assert_eq!(
            negotiate(ALL_VERSIONS, ProtocolVersion::Unknown(0x03ff)),
            Some(&TLS12)
        );
        assert_eq!(
            negotiate(ALL_VERSIONS, ProtocolVersion::TLSv1_0),
            Some(&TLS10)
        );
        assert_eq!(
            negotiate(&[&TLS11, &TLS10], ProtocolVersion::TLSv1_2),
            Some(&TLS11)
        );
    }

    #[test]
    fn rejects_ssl3_and_disabled_versions() {
        assert_eq!(negotiate(ALL_VERSIONS, ProtocolVersion::SSLv3), None);
        assert_eq!(negotiate(&[&TLS12], ProtocolVersion::TLSv1_1), None);
        assert_eq!(negotiate(&[], ProtocolVersion::TLSv1_2), None);
    }

    #[test]
    fn strategy_table() {
        assert_eq!(TLS10.iv_mode, IvMode::Chained);
        assert_eq!(TLS11.iv_mode, IvMode::Explicit);
        assert_eq!(TLS11.prf, PrfKind::Md5Sha1);
        assert_eq!(TLS12.transcript, TranscriptKind::SuiteHash);
    }
}
