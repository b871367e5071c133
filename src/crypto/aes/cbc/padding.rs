use std::iter::once;
use base64::{Engine as _, engine::general_purpose};
use rand::Rng;
use snafu::ResultExt;
use tracing::{debug, instrument, trace};

use crate::crypto::aes::{Aes128, BLOCK_SIZE};
use crate::crypto::aes::cbc::{cbc_decrypt, cbc_encrypt};
use crate::crypto::common::{break_into_blocks, generate_random_bytes, has_valid_padding, pad_pkcs_7};
use crate::crypto::xor::{byte_xor, fixed_xor, xor_in_place};
use crate::util::{Base64Snafu, Result, SearchExhaustedSnafu};

pub const FIXTURES: [&str; 10] = [
    "MDAwMDAwTm93IHRoYXQgdGhlIHBhcnR5IGlzIGp1bXBpbmc=",
    "MDAwMDAxV2l0aCB0aGUgYmFzcyBraWNrZWQgaW4gYW5kIHRoZSBWZWdhJ3MgYXJlIHB1bXBpbic=",
    "MDAwMDAyUXVpY2sgdG8gdGhlIHBvaW50LCB0byB0aGUgcG9pbnQsIG5vIGZha2luZw==",
    "MDAwMDAzQ29va2luZyBNQydzIGxpa2UgYSBwb3VuZCBvZiBiYWNvbg==",
    "MDAwMDA0QnVybmluZyAnZW0sIGlmIHlvdSBhaW4ndCBxdWljayBhbmQgbmltYmxl",
    "MDAwMDA1SSBnbyBjcmF6eSB3aGVuIEkgaGVhciBhIGN5bWJhbA==",
    "MDAwMDA2QW5kIGEgaGlnaCBoYXQgd2l0aCBhIHNvdXBlZCB1cCB0ZW1wbw==",
    "MDAwMDA3SSdtIG9uIGEgcm9sbCwgaXQncyB0aW1lIHRvIGdvIHNvbG8=",
    "MDAwMDA4b2xsaW4nIGluIG15IGZpdmUgcG9pbnQgb2g=",
    "MDAwMDA5aXRoIG15IHJhZy10b3AgZG93biBzbyBteSBoYWlyIGNhbiBibG93",
];

/// Answers a single question about a ciphertext: does it decrypt to
/// correctly padded plaintext?
pub trait PaddingOracle {
    fn valid_padding(&self, ciphertext: &[u8]) -> Result<bool>;
}

/// Holds one encrypted secret and leaks padding validity for anything
/// decrypted under its key and IV.
pub struct CbcPaddingServer {
    cipher: Aes128,
    iv: [u8; BLOCK_SIZE],
    ciphertext: Vec<u8>,
}

impl CbcPaddingServer {
    /// Encrypts one of the ten fixtures, chosen at random.
    pub fn new() -> Result<Self> {
        let choice = rand::thread_rng().gen_range(0..FIXTURES.len());
        let plaintext = general_purpose::STANDARD
            .decode(FIXTURES[choice])
            .context(Base64Snafu)?;
        Self::with_plaintext(&plaintext)
    }

    pub fn with_plaintext(plaintext: &[u8]) -> Result<Self> {
        let cipher = Aes128::from(generate_random_bytes());
        let iv: [u8; BLOCK_SIZE] = generate_random_bytes();
        let ciphertext = cbc_encrypt(&cipher, &pad_pkcs_7(plaintext, BLOCK_SIZE), &iv)?;
        Ok(Self { cipher, iv, ciphertext })
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn iv(&self) -> &[u8; BLOCK_SIZE] {
        &self.iv
    }
}

impl PaddingOracle for CbcPaddingServer {
    fn valid_padding(&self, ciphertext: &[u8]) -> Result<bool> {
        let plaintext = cbc_decrypt(&self.cipher, ciphertext, &self.iv)?;
        Ok(has_valid_padding(&plaintext))
    }
}

/// Decrypts `ciphertext` block by block through the padding oracle alone.
/// The result still carries its PKCS#7 padding.
#[instrument(skip_all)]
pub fn attack_cbc_padding(ciphertext: &[u8], iv: &[u8], oracle: &dyn PaddingOracle) -> Result<Vec<u8>> {
    let block_size = iv.len();
    let blocks = break_into_blocks(ciphertext, block_size)?;
    debug!(block_size, blocks = blocks.len(), "starting padding oracle attack");

    let mut plaintext = Vec::with_capacity(ciphertext.len());
    let previous = once(iv).chain(blocks.iter().copied());
    for (idx, (prev, target)) in previous.zip(blocks.iter()).enumerate() {
        trace!(block = idx, "attacking block");
        plaintext.extend(attack_cbc_padding_single_block(prev, target, oracle)?);
    }
    Ok(plaintext)
}

fn attack_cbc_padding_single_block(prev: &[u8], target: &[u8], oracle: &dyn PaddingOracle) -> Result<Vec<u8>> {
    let block_size = prev.len();
    let query = |forged: &[u8]| oracle.valid_padding(&[forged, target].concat());

    // `forged` always makes the last `solved` bytes of the target decrypt to `solved`
    let mut forged = prev.to_vec();
    let mut solved = 0;

    // The block may already end in valid padding (the last block always
    // does). Its length is wherever corrupting a byte first breaks it.
    if query(&forged)? {
        let mut corrupted = forged.clone();
        for i in 0..block_size {
            corrupted[i] ^= 0x01;
            if !query(&corrupted)? {
                solved = block_size - i;
                break;
            }
        }
        if solved == 0 {
            return SearchExhaustedSnafu { offset: 0usize }.fail();
        }
        debug!(padding = solved, "found organic padding");
    }

    while solved < block_size {
        let next = solved + 1;
        let pos = block_size - next;
        let bump = (solved ^ next) as u8;
        xor_in_place(&mut forged[pos + 1..], &vec![bump; solved])?;

        let mut found = false;
        for v in 0..=u8::MAX {
            forged[pos] = v;
            if !query(&forged)? {
                continue;
            }
            // A hit on the last byte could be \x02\x02 or longer by luck.
            // Disturbing the byte before it rules that out.
            if solved == 0 && block_size > 1 {
                let mut check = forged.clone();
                check[pos - 1] ^= 0xff;
                if !query(&check)? {
                    continue;
                }
            }
            found = true;
            break;
        }
        if !found {
            return SearchExhaustedSnafu { offset: pos }.fail();
        }
        solved = next;
    }

    // Every byte of the target now decrypts to block_size
    let intermediate = byte_xor(&forged, block_size as u8);
    fixed_xor(&intermediate, prev)
}

#[cfg(test)]
use lazy_static::lazy_static;
#[cfg(test)]
use crate::crypto::common::strip_pad_pkcs_7;

#[cfg(test)]
lazy_static! {
    static ref DECODED: Vec<Vec<u8>> = FIXTURES
        .iter()
        .map(|s| general_purpose::STANDARD.decode(s).expect("Base64 decoding failed"))
        .collect();
}

#[cfg(test)]
fn recover(server: &CbcPaddingServer) -> Vec<u8> {
    attack_cbc_padding(server.ciphertext(), server.iv(), server).unwrap()
}

#[test]
fn test_attack_cbc_padding() {
    crate::util::init_tracing();

    for plaintext in DECODED.iter() {
        for _ in 0..3 {
            let server = CbcPaddingServer::with_plaintext(plaintext).unwrap();
            assert_eq!(pad_pkcs_7(plaintext, BLOCK_SIZE), recover(&server));
        }
    }
}

#[test]
fn test_attack_cbc_padding_random_fixture() {
    let server = CbcPaddingServer::new().unwrap();
    let recovered = strip_pad_pkcs_7(&recover(&server)).unwrap();
    assert!(DECODED.contains(&recovered));
    assert!(recovered.starts_with(b"00000"));
}

#[test]
fn test_attack_cbc_padding_organic_endings() {
    // Blocks that already look padded, in the middle and at the end
    let cases: [&[u8]; 5] = [
        b"fifteen bytes!!\x01and then more",
        b"fourteen bytes\x02\x02and then more",
        b"exactly sixteen!",
        b"",
        b"\x03\x03\x03\x03\x03\x03\x03\x03\x03\x03\x03\x03\x03\x03\x03\x03\x03",
    ];
    for plaintext in cases {
        for _ in 0..5 {
            let server = CbcPaddingServer::with_plaintext(plaintext).unwrap();
            assert_eq!(pad_pkcs_7(plaintext, BLOCK_SIZE), recover(&server));
        }
    }
}

#[test]
fn test_valid_padding() {
    use crate::util::Error;

    let server = CbcPaddingServer::with_plaintext(b"YELLOW SUBMARINE").unwrap();
    assert!(server.valid_padding(server.ciphertext()).unwrap());
    assert_eq!(32, server.ciphertext().len());

    let mut tampered = server.ciphertext().to_vec();
    // Turns the final \x10 into \x11
    tampered[15] ^= 0x01;
    assert!(!server.valid_padding(&tampered).unwrap());
    assert!(matches!(server.valid_padding(&tampered[..20]), Err(Error::NotBlockAligned { .. })));
}
