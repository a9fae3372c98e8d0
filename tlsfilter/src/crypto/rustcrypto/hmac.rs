use core::marker::PhantomData;

use ::hmac::digest::core_api::BlockSizeUser;
use ::hmac::digest::{Digest, KeyInit};
use ::hmac::{Mac, SimpleHmac};

use crate::crypto;

/// A [`crypto::hmac::Hmac`] over any RustCrypto [`Digest`].
pub struct Hmac<D>(PhantomData<fn() -> D>);

pub static HMAC_MD5: Hmac<md5::Md5> = Hmac(PhantomData);
pub static HMAC_SHA1: Hmac<sha1::Sha1> = Hmac(PhantomData);
pub static HMAC_SHA256: Hmac<sha2::Sha256> = Hmac(PhantomData);

impl<D> crypto::hmac::Hmac for Hmac<D>
where
    D: Digest + BlockSizeUser + Clone + Send + Sync + 'static,
{
    fn open_key(&self, key: &[u8]) -> Box<dyn crypto::hmac::Key> {
        // HMAC takes keys of any length, so this cannot fail
        let mac = <SimpleHmac<D> as KeyInit>::new_from_slice(key)
            .expect("HMAC accepts keys of any length");
        Box::new(HmacKey(mac))
    }

    fn hash_output_len(&self) -> usize {
        <D as Digest>::output_size()
    }
}

struct HmacKey<D: Digest + BlockSizeUser>(SimpleHmac<D>);

impl<D> crypto::hmac::Key for HmacKey<D>
where
    D: Digest + BlockSizeUser + Clone + Send + Sync + 'static,
{
    fn sign_concat(&self, first: &[u8], middle: &[&[u8]], last: &[u8]) -> crypto::hmac::Tag {
        let mut ctx = self.0.clone();
        ctx.update(first);
        for m in middle {
            ctx.update(m);
        }
        ctx.update(last);
        crypto::hmac::Tag::new(&ctx.finalize().into_bytes()[..])
    }

    fn tag_len(&self) -> usize {
        <D as Digest>::output_size()
    }
}
