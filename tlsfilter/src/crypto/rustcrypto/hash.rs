use core::marker::PhantomData;

use sha2::Digest;

use crate::crypto::hash;

/// A [`hash::Hash`] over any RustCrypto [`Digest`].
pub struct Hash<D>(PhantomData<fn() -> D>);

pub static MD5: Hash<md5::Md5> = Hash(PhantomData);
pub static SHA1: Hash<sha1::Sha1> = Hash(PhantomData);
pub static SHA256: Hash<sha2::Sha256> = Hash(PhantomData);

impl<D> hash::Hash for Hash<D>
where
    D: Digest + Clone + Send + Sync + 'static,
{
    fn start(&self) -> Box<dyn hash::Context> {
        Box::new(Context(D::new()))
    }

    fn hash(&self, data: &[u8]) -> hash::Output {
        hash::Output::new(&D::digest(data)[..])
    }

    fn output_len(&self) -> usize {
        <D as Digest>::output_size()
    }
}

struct Context<D>(D);

impl<D> hash::Context for Context<D>
where
    D: Digest + Clone + Send + Sync + 'static,
{
    fn fork_finish(&self) -> hash::Output {
        hash::Output::new(&self.0.clone().finalize()[..])
    }

    fn fork(&self) -> Box<dyn hash::Context> {
        Box::new(Self(self.0.clone()))
    }

    fn finish(self: Box<Self>) -> hash::Output {
        hash::Output::new(&self.0.finalize()[..])
    }

    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }
}
