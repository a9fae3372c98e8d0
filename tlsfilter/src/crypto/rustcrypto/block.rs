use core::marker::PhantomData;

use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{
    BlockCipher, BlockDecryptMut, BlockEncryptMut, BlockSizeUser, KeyInit, KeyIvInit,
    KeySizeUser,
};

use crate::crypto::cipher::CbcMode;
use crate::error::Error;

/// [`CbcMode`] over any RustCrypto block cipher, using the `cbc` crate.
pub struct Cbc<C>(PhantomData<fn() -> C>);

pub static AES_128_CBC: Cbc<aes::Aes128> = Cbc(PhantomData);
pub static AES_256_CBC: Cbc<aes::Aes256> = Cbc(PhantomData);
pub static DES_EDE3_CBC: Cbc<des::TdesEde3> = Cbc(PhantomData);

impl<C> CbcMode for Cbc<C>
where
    C: BlockCipher + BlockEncryptMut + BlockDecryptMut + KeyInit + 'static,
{
    fn key_len(&self) -> usize {
        <C as KeySizeUser>::key_size()
    }

    fn block_len(&self) -> usize {
        <C as BlockSizeUser>::block_size()
    }

    fn encrypt(&self, key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<(), Error> {
        let len = buf.len();
        cbc::Encryptor::<C>::new_from_slices(key, iv)
            .map_err(|_| Error::EncryptError)?
            .encrypt_padded_mut::<NoPadding>(buf, len)
            .map_err(|_| Error::EncryptError)?;
        Ok(())
    }

    fn decrypt(&self, key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<(), Error> {
        cbc::Decryptor::<C>::new_from_slices(key, iv)
            .map_err(|_| Error::DecryptError)?
            .decrypt_padded_mut::<NoPadding>(buf)
            .map_err(|_| Error::DecryptError)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{AES_128_CBC, AES_256_CBC, DES_EDE3_CBC};
    use crate::crypto::cipher::CbcMode;
    use crate::error::Error;

    #[test]
    fn sizes() {
        assert_eq!((AES_128_CBC.key_len(), AES_128_CBC.block_len()), (16, 16));
        assert_eq!((AES_256_CBC.key_len(), AES_256_CBC.block_len()), (32, 16));
        assert_eq!((DES_EDE3_CBC.key_len(), DES_EDE3_CBC.block_len()), (24, 8));
    }

    #[test]
    fn aes128_cbc_known_answer() {
        // NIST SP 800-38A F.2.1, first block
        let key = [
            0x2b, 0x7e, 0x15, 0x16, 0x28, 0xae, 0xd2, 0xa6, 0xab, 0xf7, 0x15, 0x88, 0x09, 0xcf,
            0x4f, 0x3c,
        ];
        let iv: [u8; 16] = core::array::from_fn(|i| i as u8);
        let mut buf = [
            0x6b, 0xc1, 0xbe, 0xe2, 0x2e, 0x40, 0x9f, 0x96, 0xe9, 0x3d, 0x7e, 0x11, 0x73, 0x93,
            0x17, 0x2a,
        ];
        let plain = buf;

        AES_128_CBC
            .encrypt(&key, &iv, &mut buf)
            .unwrap();
        assert_eq!(
            buf,
            [
                0x76, 0x49, 0xab, 0xac, 0x81, 0x19, 0xb2, 0x46, 0xce, 0xe9, 0x8e, 0x9b, 0x12, 0xe9,
                0x19, 0x7d
            ]
        );

        AES_128_CBC
            .decrypt(&key, &iv, &mut buf)
            .unwrap();
        assert_eq!(buf, plain);
    }

    #[test]
    fn chaining_carries_across_calls() {
        let key = [7u8; 32];
        let iv = [9u8; 16];
        let plain = [0x42u8; 64];

        let mut whole = plain;
        AES_256_CBC
            .encrypt(&key, &iv, &mut whole)
            .unwrap();

        // encrypting in two halves, chaining from the last ciphertext block,
        // gives the same result
        let mut first = [0x42u8; 32];
        let mut second = [0x42u8; 32];
        AES_256_CBC
            .encrypt(&key, &iv, &mut first)
            .unwrap();
        AES_256_CBC
            .encrypt(&key, &first[16..], &mut second)
            .unwrap();
        assert_eq!(&whole[..32], &first);
        assert_eq!(&whole[32..], &second);
    }

    #[test]
    fn rejects_partial_blocks_and_bad_keys() {
        let mut buf = [0u8; 12];
        assert_eq!(
            DES_EDE3_CBC.encrypt(&[1u8; 24], &[0u8; 8], &mut buf),
            Err(Error::EncryptError)
        );
        let mut buf = [0u8; 16];
        assert_eq!(
            AES_128_CBC.decrypt(&[1u8; 15], &[0u8; 16], &mut buf),
            Err(Error::DecryptError)
        );
    }
}
