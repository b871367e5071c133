use concat_arrays::concat_arrays;
use snafu::ensure;

pub mod bitflip;
pub mod edit;

use crate::crypto::aes::{Aes128, BlockCipher, BLOCK_SIZE};
use crate::crypto::xor::xor_in_place;
use crate::util::{BlockWidthSnafu, Result};

pub const NONCE_SIZE: usize = 8;

// nonce || little-endian 64-bit block counter
pub fn ctr_counter_block(nonce: &[u8; NONCE_SIZE], counter: u64) -> [u8; BLOCK_SIZE] {
    concat_arrays!(*nonce, counter.to_le_bytes())
}

#[test]
fn test_ctr_counter_block_layout() {
    let nonce = *b"\x01\x02\x03\x04\x05\x06\x07\x08";
    let block_0 = ctr_counter_block(&nonce, 0);
    let block_1 = ctr_counter_block(&nonce, 1);
    assert_eq!(block_0[..NONCE_SIZE], block_1[..NONCE_SIZE]);
    assert_eq!(nonce, block_1[..NONCE_SIZE]);
    assert_eq!([0u8; 8], block_0[NONCE_SIZE..]);
    assert_eq!([1u8, 0, 0, 0, 0, 0, 0, 0], block_1[NONCE_SIZE..]);
    assert_eq!(hex!("0102030405060708 0001000000000000"), ctr_counter_block(&nonce, 256));
}

/// Encrypts or decrypts (they are the same operation) by XORing with the
/// keystream `E(nonce || 0), E(nonce || 1), ...`, the last keystream block cut
/// down to whatever is left. Never pads.
pub fn ctr_apply<C: BlockCipher + ?Sized>(cipher: &C, buf: &[u8], nonce: &[u8; NONCE_SIZE]) -> Result<Vec<u8>> {
    let block_size = cipher.block_size();
    ensure!(block_size == BLOCK_SIZE, BlockWidthSnafu { expected: BLOCK_SIZE, len: block_size });
    let mut out = buf.to_vec();
    for (counter, chunk) in out.chunks_mut(BLOCK_SIZE).enumerate() {
        let mut keystream = ctr_counter_block(nonce, counter as u64);
        cipher.encrypt_block(&mut keystream)?;
        xor_in_place(chunk, &keystream[..chunk.len()])?;
    }
    Ok(out)
}

pub fn aes_ctr(buf: &[u8], key: &[u8], nonce: &[u8; NONCE_SIZE]) -> Result<Vec<u8>> {
    ctr_apply(&Aes128::new(key)?, buf, nonce)
}

#[test]
fn test_aes_ctr() {
    use base64::{Engine as _, engine::general_purpose};

    let case = b"L77na/nrFsKvynd6HzOoG7GHTLXsTVu9qvY/2syLXzhPweyyMTJULu/6/kXX0KSvoOLSFQ==";
    let ciphertext = general_purpose::STANDARD
        .decode(case)
        .expect("Base64 decoding failed");
    let key = b"YELLOW SUBMARINE";
    let nonce = [0u8; NONCE_SIZE];
    let returned = aes_ctr(&ciphertext, key, &nonce).unwrap();
    let expected = b"Yo, VIP Let's kick it Ice, Ice, baby Ice, Ice, baby ".to_vec();
    assert_eq!(expected, returned);
}

#[test]
fn test_aes_ctr_is_self_inverse() {
    use crate::crypto::common::generate_random_bytes;

    let key: [u8; 16] = generate_random_bytes();
    let nonce: [u8; NONCE_SIZE] = generate_random_bytes();
    let plaintext: Vec<u8> = (0..100u8).collect();
    for len in 0..plaintext.len() {
        let ciphertext = aes_ctr(&plaintext[..len], &key, &nonce).unwrap();
        assert_eq!(len, ciphertext.len());
        assert_eq!(plaintext[..len].to_vec(), aes_ctr(&ciphertext, &key, &nonce).unwrap());
    }
}

#[test]
fn test_aes_ctr_keystream_blocks() {
    // Encrypting zeros exposes the raw keystream
    let key = b"YELLOW SUBMARINE";
    let nonce = *b"noncenon";
    let keystream = aes_ctr(&[0u8; 40], key, &nonce).unwrap();
    let cipher = Aes128::new(key).unwrap();
    for counter in 0..3u64 {
        let mut expected = ctr_counter_block(&nonce, counter);
        cipher.encrypt_block(&mut expected).unwrap();
        let start = counter as usize * BLOCK_SIZE;
        let end = usize::min(start + BLOCK_SIZE, keystream.len());
        assert_eq!(expected[..end - start], keystream[start..end]);
    }
    assert_ne!(keystream[..16], keystream[16..32]);
}
