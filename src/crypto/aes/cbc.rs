use snafu::ensure;

pub mod bitflip;
pub mod key_as_iv;
pub mod padding;

use crate::crypto::aes::{Aes128, BlockCipher};
use crate::crypto::xor::xor_in_place;
use crate::util::{BlockWidthSnafu, NotBlockAlignedSnafu, Result};

fn check_cbc_inputs(buf: &[u8], iv: &[u8], block_size: usize) -> Result<()> {
    ensure!(buf.len() % block_size == 0, NotBlockAlignedSnafu { len: buf.len(), block_size });
    ensure!(iv.len() == block_size, BlockWidthSnafu { expected: block_size, len: iv.len() });
    Ok(())
}

// No padding happens here. Callers pad before encrypting.
pub fn cbc_encrypt<C: BlockCipher + ?Sized>(cipher: &C, buf: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
    let block_size = cipher.block_size();
    check_cbc_inputs(buf, iv, block_size)?;
    let mut out = buf.to_vec();
    let mut prev = iv.to_vec();
    for block in out.chunks_exact_mut(block_size) {
        xor_in_place(block, &prev)?;
        cipher.encrypt_block(block)?;
        prev.copy_from_slice(block);
    }
    Ok(out)
}

// ...and strip after decrypting.
pub fn cbc_decrypt<C: BlockCipher + ?Sized>(cipher: &C, buf: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
    let block_size = cipher.block_size();
    check_cbc_inputs(buf, iv, block_size)?;
    let mut out = buf.to_vec();
    let previous = std::iter::once(iv).chain(buf.chunks_exact(block_size));
    for (block, prev) in out.chunks_exact_mut(block_size).zip(previous) {
        cipher.decrypt_block(block)?;
        xor_in_place(block, prev)?;
    }
    Ok(out)
}

pub fn aes_cbc_encrypt(buf: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
    cbc_encrypt(&Aes128::new(key)?, buf, iv)
}

pub fn aes_cbc_decrypt(buf: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
    cbc_decrypt(&Aes128::new(key)?, buf, iv)
}

#[test]
fn test_aes_cbc_known_answer() {
    // NIST SP 800-38A, F.2.1
    let key = hex!("2b7e151628aed2a6abf7158809cf4f3c");
    let iv = hex!("000102030405060708090a0b0c0d0e0f");
    let plaintext = hex!("6bc1bee22e409f96e93d7e117393172a ae2d8a571e03ac9c9eb76fac45af8e51");
    let expected = hex!("7649abac8119b246cee98e9b12e9197d 5086cb9b507219ee95db113a917678b2");
    let ciphertext = aes_cbc_encrypt(&plaintext, &key, &iv).unwrap();
    assert_eq!(expected.to_vec(), ciphertext);
    assert_eq!(plaintext.to_vec(), aes_cbc_decrypt(&ciphertext, &key, &iv).unwrap());
}

#[test]
fn test_aes_cbc_encrypt_and_decrypt() {
    use crate::crypto::common::{pad_pkcs_7, strip_pad_pkcs_7};

    let key = b"YELLOW SUBMARINE";
    let iv = b"yellow submarine";
    let plaintext = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
    for len in 0..plaintext.len() {
        let padded = pad_pkcs_7(&plaintext[..len], 16);
        let ciphertext = aes_cbc_encrypt(&padded, key, iv).unwrap();
        let result = aes_cbc_decrypt(&ciphertext, key, iv).unwrap();
        assert_eq!(padded, result);
        assert_eq!(plaintext[..len].to_vec(), strip_pad_pkcs_7(&result).unwrap());
    }
}

#[test]
fn test_cbc_rejects_bad_inputs() {
    use crate::util::Error;

    let key = b"YELLOW SUBMARINE";
    assert!(matches!(aes_cbc_encrypt(&[0; 20], key, &[0; 16]), Err(Error::NotBlockAligned { .. })));
    assert!(matches!(aes_cbc_decrypt(&[0; 32], key, &[0; 8]), Err(Error::BlockWidth { expected: 16, len: 8 })));
}

#[test]
fn test_cbc_equal_blocks_encrypt_differently() {
    use crate::crypto::common::repeating_block;

    let ciphertext = aes_cbc_encrypt(&[b'A'; 64], b"YELLOW SUBMARINE", &[0; 16]).unwrap();
    assert_eq!(None, repeating_block(&ciphertext, 16));
}

#[test]
fn test_cbc_single_bit_flip_propagation() {
    let key = b"YELLOW SUBMARINE";
    let iv = [7u8; 16];
    let plaintext = [b'A'; 48];
    let mut ciphertext = aes_cbc_encrypt(&plaintext, key, &iv).unwrap();
    ciphertext[16 + 5] ^= 0x01;
    let decrypted = aes_cbc_decrypt(&ciphertext, key, &iv).unwrap();
    // The edited block is scrambled, the next one has exactly the same bit flipped
    assert_eq!(plaintext[..16], decrypted[..16]);
    assert_ne!(plaintext[16..32], decrypted[16..32]);
    assert_eq!(b'A' ^ 0x01, decrypted[32 + 5]);
    decrypted[32..].iter()
        .enumerate()
        .filter(|&(i, _)| i != 5)
        .for_each(|(_, &b)| assert_eq!(b'A', b));
}

#[test]
fn test_cbc_round_trip_other_widths() {
    use crate::crypto::aes::ToyCipher;
    use crate::crypto::common::pad_pkcs_7;

    for width in [2usize, 5, 8, 32] {
        let cipher = ToyCipher { key: vec![0x5a; width] };
        let iv = vec![0x11; width];
        let padded = pad_pkcs_7(b"CBC round trips at any block width", width);
        let ciphertext = cbc_encrypt(&cipher, &padded, &iv).unwrap();
        assert_eq!(padded, cbc_decrypt(&cipher, &ciphertext, &iv).unwrap());
    }
}
