pub mod byte_by_byte;
pub mod cut_and_paste;

use crate::crypto::aes::{Aes128, BlockCipher};
use crate::util::Result;

pub fn ecb_encrypt<C: BlockCipher + ?Sized>(cipher: &C, buf: &[u8]) -> Result<Vec<u8>> {
    let mut out = buf.to_vec();
    cipher.encrypt_blocks(&mut out)?;
    Ok(out)
}

pub fn ecb_decrypt<C: BlockCipher + ?Sized>(cipher: &C, buf: &[u8]) -> Result<Vec<u8>> {
    let mut out = buf.to_vec();
    cipher.decrypt_blocks(&mut out)?;
    Ok(out)
}

pub fn aes_ecb_encrypt(buf: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    ecb_encrypt(&Aes128::new(key)?, buf)
}

pub fn aes_ecb_decrypt(buf: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    ecb_decrypt(&Aes128::new(key)?, buf)
}

#[test]
fn test_aes_ecb_known_answer() {
    // NIST SP 800-38A, F.1.1 / F.1.2
    let key = hex!("2b7e151628aed2a6abf7158809cf4f3c");
    let plaintext = hex!("6bc1bee22e409f96e93d7e117393172a ae2d8a571e03ac9c9eb76fac45af8e51");
    let expected = hex!("3ad77bb40d7a3660a89ecaf32466ef97 f5d3d58503b9699de785895a96fdbaaf");
    let ciphertext = aes_ecb_encrypt(&plaintext, &key).unwrap();
    assert_eq!(expected.to_vec(), ciphertext);
    assert_eq!(plaintext.to_vec(), aes_ecb_decrypt(&ciphertext, &key).unwrap());
}

#[test]
fn test_aes_ecb_is_deterministic() {
    let key = b"YELLOW SUBMARINE";
    let plaintext = b"YELLOW SUBMARINEsomething else!!YELLOW SUBMARINE";
    let ciphertext = aes_ecb_encrypt(plaintext, key).unwrap();
    assert_eq!(ciphertext[0..16], ciphertext[32..48]);
    assert_ne!(ciphertext[0..16], ciphertext[16..32]);
    assert_eq!(ciphertext, aes_ecb_encrypt(plaintext, key).unwrap());
}

#[test]
fn test_aes_ecb_rejects_unaligned_input() {
    use crate::util::Error;

    let result = aes_ecb_encrypt(b"fifteen bytes!!", b"YELLOW SUBMARINE");
    assert!(matches!(result, Err(Error::NotBlockAligned { len: 15, block_size: 16 })));
    assert!(aes_ecb_decrypt(&[0; 33], b"YELLOW SUBMARINE").is_err());
    assert!(aes_ecb_encrypt(&[0; 16], b"").is_err());
}

#[test]
fn test_ecb_round_trip_other_widths() {
    use crate::crypto::aes::ToyCipher;

    for width in [1usize, 3, 8, 16, 24] {
        let cipher = ToyCipher { key: (0..width as u8).map(|x| x.wrapping_mul(37)).collect() };
        let plaintext: Vec<u8> = (0..(5 * width) as u8).collect();
        let ciphertext = ecb_encrypt(&cipher, &plaintext).unwrap();
        assert_ne!(plaintext, ciphertext);
        assert_eq!(plaintext, ecb_decrypt(&cipher, &ciphertext).unwrap());
    }
}
