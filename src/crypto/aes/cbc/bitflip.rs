use snafu::OptionExt;
use tracing::{debug, instrument};

use crate::crypto::aes::{Aes128, BLOCK_SIZE};
use crate::crypto::aes::cbc::{cbc_decrypt, cbc_encrypt};
use crate::crypto::common::{generate_random_bytes, pad_pkcs_7, strip_pad_pkcs_7};
use crate::crypto::oracle::*;
use crate::util::{Result, SearchExhaustedSnafu};

pub struct CbcCommentOracle {
    cipher: Aes128,
    iv: [u8; BLOCK_SIZE],
}

impl CbcCommentOracle {
    pub fn new() -> Self {
        Self {
            cipher: Aes128::from(generate_random_bytes()),
            iv: generate_random_bytes(),
        }
    }
}

impl Default for CbcCommentOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl CommentOracle for CbcCommentOracle {
    fn encrypt_userdata(&self, userdata: &[u8]) -> Result<Vec<u8>> {
        let plaintext = pad_pkcs_7(&wrap_userdata(userdata), BLOCK_SIZE);
        cbc_encrypt(&self.cipher, &plaintext, &self.iv)
    }

    fn is_admin(&self, ciphertext: &[u8]) -> Result<bool> {
        let plaintext = strip_pad_pkcs_7(&cbc_decrypt(&self.cipher, ciphertext, &self.iv)?)?;
        Ok(contains_admin(&plaintext))
    }
}

// Block index where userdata starts, and how many filler bytes it takes to
// reach the next block boundary from there.
fn locate_userdata(oracle: &dyn CommentOracle, block_size: usize) -> Result<(usize, usize)> {
    let with_a = oracle.encrypt_userdata(b"A")?;
    let with_b = oracle.encrypt_userdata(b"B")?;
    let first_block = with_a.chunks(block_size)
        .zip(with_b.chunks(block_size))
        .position(|(a, b)| a != b)
        .context(SearchExhaustedSnafu { offset: 0usize })?;

    // Once the filler fills the block, the byte after it no longer touches it
    for align in 1..block_size {
        let filler = vec![b'A'; align];
        let x = oracle.encrypt_userdata(&[filler.as_slice(), b"X".as_slice()].concat())?;
        let y = oracle.encrypt_userdata(&[filler.as_slice(), b"Y".as_slice()].concat())?;
        let range = first_block*block_size..(first_block + 1)*block_size;
        if x[range.clone()] == y[range] {
            return Ok((first_block, align));
        }
    }
    Ok((first_block, 0))
}

/// Encrypts userdata whose placeholder starts a fresh block, preceded by one
/// block of filler. Returns the ciphertext and the offset of that filler
/// block, which is the one to flip.
pub fn cbc_bitflip_payload(oracle: &dyn CommentOracle) -> Result<(Vec<u8>, usize)> {
    let block_size = BLOCK_SIZE;
    let (first_block, align) = locate_userdata(oracle, block_size)?;
    let sacrificial = if align == 0 { first_block } else { first_block + 1 };
    debug!(first_block, align, sacrificial, "located userdata");

    let payload = [
        vec![b'A'; align],
        vec![b'A'; block_size],
        ADMIN_PLACEHOLDER.to_vec(),
    ].concat();
    Ok((oracle.encrypt_userdata(&payload)?, sacrificial*block_size))
}

/// Produces a ciphertext that `is_admin` accepts, using only
/// `encrypt_userdata`. Costs one block of garbage in the plaintext.
#[instrument(skip_all)]
pub fn attack_cbc_bitflip(oracle: &dyn CommentOracle) -> Result<Vec<u8>> {
    let (mut ciphertext, offset) = cbc_bitflip_payload(oracle)?;
    // A bit flipped in one ciphertext block flips the same bit of the next
    // block's plaintext
    flip_placeholder(&mut ciphertext, offset)?;
    Ok(ciphertext)
}

// Puts extra bytes in front of the userdata so it no longer starts on a
// block boundary
#[cfg(test)]
struct Shifted {
    inner: CbcCommentOracle,
    extra: Vec<u8>,
}

#[cfg(test)]
impl CommentOracle for Shifted {
    fn encrypt_userdata(&self, userdata: &[u8]) -> Result<Vec<u8>> {
        self.inner.encrypt_userdata(&[self.extra.as_slice(), userdata].concat())
    }

    fn is_admin(&self, ciphertext: &[u8]) -> Result<bool> {
        self.inner.is_admin(ciphertext)
    }
}

#[test]
fn test_cbc_comment_oracle_quotes_input() {
    let oracle = CbcCommentOracle::new();
    let ciphertext = oracle.encrypt_userdata(ADMIN_TOKEN).unwrap();
    assert!(!oracle.is_admin(&ciphertext).unwrap());
    assert_eq!(0, ciphertext.len() % BLOCK_SIZE);
}

#[test]
fn test_attack_cbc_bitflip() {
    crate::util::init_tracing();

    for _ in 0..10 {
        let oracle = CbcCommentOracle::new();
        let (mut ciphertext, offset) = cbc_bitflip_payload(&oracle).unwrap();
        assert!(!oracle.is_admin(&ciphertext).unwrap());

        flip_placeholder(&mut ciphertext, offset).unwrap();
        assert!(oracle.is_admin(&ciphertext).unwrap());

        let forged = attack_cbc_bitflip(&oracle).unwrap();
        assert!(oracle.is_admin(&forged).unwrap());
    }
}

#[test]
fn test_attack_cbc_bitflip_unaligned_userdata() {
    for extra_len in 0..2*BLOCK_SIZE {
        let oracle = Shifted { inner: CbcCommentOracle::new(), extra: vec![b'x'; extra_len] };
        let (first_block, align) = locate_userdata(&oracle, BLOCK_SIZE).unwrap();
        let start = COMMENT_PREFIX.len() + extra_len;
        assert_eq!(start / BLOCK_SIZE, first_block);
        assert_eq!((BLOCK_SIZE - start % BLOCK_SIZE) % BLOCK_SIZE, align);

        let (mut ciphertext, offset) = cbc_bitflip_payload(&oracle).unwrap();
        assert!(!oracle.is_admin(&ciphertext).unwrap());
        flip_placeholder(&mut ciphertext, offset).unwrap();
        assert!(oracle.is_admin(&ciphertext).unwrap());
    }
}
