use super::hmac;

/// `P_hash` from RFC 5246 section 5, which is also the whole TLS 1.2 PRF.
///
/// `label` and `seed` are concatenated to form the PRF seed.
pub fn prf(out: &mut [u8], hmac_key: &dyn hmac::Key, label: &[u8], seed: &[u8]) {
    // A(1)
    let mut current_a = hmac_key.sign(&[label, seed]);

    let chunk_size = hmac_key.tag_len();
    for chunk in out.chunks_mut(chunk_size) {
        // P_hash[i] = HMAC_hash(secret, A(i) + seed)
        let p_term = hmac_key.sign(&[current_a.as_ref(), label, seed]);
        chunk.copy_from_slice(&p_term.as_ref()[..chunk.len()]);

        // A(i+1) = HMAC_hash(secret, A(i))
        current_a = hmac_key.sign(&[current_a.as_ref()]);
    }
}

/// The TLS 1.0 and 1.1 PRF from RFC 2246 section 5.
///
/// The secret is split into two halves (which overlap by one byte when its
/// length is odd); the output is `P_MD5(S1, ...) XOR P_SHA1(S2, ...)`.
pub fn prf_md5_sha1(
    out: &mut [u8],
    md5: &dyn hmac::Hmac,
    sha1: &dyn hmac::Hmac,
    secret: &[u8],
    label: &[u8],
    seed: &[u8],
) {
    let half = (secret.len() + 1) / 2;
    let s1 = &secret[..half];
    let s2 = &secret[secret.len() - half..];

    prf(out, md5.open_key(s1).as_ref(), label, seed);

    let mut sha1_out = vec![0u8; out.len()];
    prf(&mut sha1_out, sha1.open_key(s2).as_ref(), label, seed);

    for (o, s) in out.iter_mut().zip(sha1_out.iter()) {
        *o ^= s;
    }
}
