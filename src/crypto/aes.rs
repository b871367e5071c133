use itertools::Itertools;
use openssl::symm::{Cipher, Crypter, Mode};
use snafu::{ensure, OptionExt, ResultExt};

pub mod ecb;
pub mod cbc;
pub mod ctr;

use crate::crypto::common::repeating_block;
use crate::crypto::oracle::*;
use crate::util::{
    BlockWidthSnafu, CipherSnafu, InvalidKeyLengthSnafu, NotBlockAlignedSnafu, Result, SearchExhaustedSnafu,
};

pub const BLOCK_SIZE: usize = 16;

// Longest run of filler we feed an oracle while waiting for its output to grow
const MAX_BLOCK_PROBE: usize = 256;

/// A keyed permutation over fixed-width blocks. Every mode in this crate is
/// built on top of this, and never looks inside it.
pub trait BlockCipher {
    fn block_size(&self) -> usize;

    /// Encrypts exactly one block in place. Any other width is an error.
    fn encrypt_block(&self, block: &mut [u8]) -> Result<()>;

    /// Inverse of `encrypt_block`.
    fn decrypt_block(&self, block: &mut [u8]) -> Result<()>;

    /// Encrypts every block of a block-aligned buffer independently.
    fn encrypt_blocks(&self, buf: &mut [u8]) -> Result<()> {
        let block_size = self.block_size();
        ensure!(buf.len() % block_size == 0, NotBlockAlignedSnafu { len: buf.len(), block_size });
        buf.chunks_exact_mut(block_size).try_for_each(|block| self.encrypt_block(block))
    }

    fn decrypt_blocks(&self, buf: &mut [u8]) -> Result<()> {
        let block_size = self.block_size();
        ensure!(buf.len() % block_size == 0, NotBlockAlignedSnafu { len: buf.len(), block_size });
        buf.chunks_exact_mut(block_size).try_for_each(|block| self.decrypt_block(block))
    }
}

/// AES-128, supplied by OpenSSL as a raw single-block permutation.
#[derive(Clone)]
pub struct Aes128 {
    key: [u8; BLOCK_SIZE],
}

impl Aes128 {
    pub fn new(key: &[u8]) -> Result<Self> {
        let key: [u8; BLOCK_SIZE] = key
            .try_into()
            .ok()
            .context(InvalidKeyLengthSnafu { expected: BLOCK_SIZE, len: key.len() })?;
        Ok(Self::from(key))
    }

    // One OpenSSL context for the whole buffer. The raw ECB cipher with
    // padding off is exactly the block permutation applied blockwise.
    fn permute(&self, mode: Mode, buf: &mut [u8]) -> Result<()> {
        ensure!(buf.len() % BLOCK_SIZE == 0, NotBlockAlignedSnafu { len: buf.len(), block_size: BLOCK_SIZE });
        let mut crypter = Crypter::new(Cipher::aes_128_ecb(), mode, &self.key, None)
            .context(CipherSnafu)?;
        crypter.pad(false);
        let mut out = vec![0u8; buf.len() + BLOCK_SIZE];
        let mut count = crypter.update(buf, &mut out).context(CipherSnafu)?;
        count += crypter.finalize(&mut out[count..]).context(CipherSnafu)?;
        debug_assert_eq!(buf.len(), count);
        buf.copy_from_slice(&out[..buf.len()]);
        Ok(())
    }
}

impl From<[u8; BLOCK_SIZE]> for Aes128 {
    fn from(key: [u8; BLOCK_SIZE]) -> Self {
        Self { key }
    }
}

impl BlockCipher for Aes128 {
    fn block_size(&self) -> usize {
        BLOCK_SIZE
    }

    fn encrypt_block(&self, block: &mut [u8]) -> Result<()> {
        ensure!(block.len() == BLOCK_SIZE, BlockWidthSnafu { expected: BLOCK_SIZE, len: block.len() });
        self.permute(Mode::Encrypt, block)
    }

    fn decrypt_block(&self, block: &mut [u8]) -> Result<()> {
        ensure!(block.len() == BLOCK_SIZE, BlockWidthSnafu { expected: BLOCK_SIZE, len: block.len() });
        self.permute(Mode::Decrypt, block)
    }

    fn encrypt_blocks(&self, buf: &mut [u8]) -> Result<()> {
        self.permute(Mode::Encrypt, buf)
    }

    fn decrypt_blocks(&self, buf: &mut [u8]) -> Result<()> {
        self.permute(Mode::Decrypt, buf)
    }
}

#[test]
fn test_aes128_known_answer() {
    // FIPS-197, appendix C.1
    let cipher = Aes128::new(&hex!("000102030405060708090a0b0c0d0e0f")).unwrap();
    let mut block = hex!("00112233445566778899aabbccddeeff");
    cipher.encrypt_block(&mut block).unwrap();
    assert_eq!(hex!("69c4e0d86a7b0430d8cdb78070b4c55a"), block);
    cipher.decrypt_block(&mut block).unwrap();
    assert_eq!(hex!("00112233445566778899aabbccddeeff"), block);
}

#[test]
fn test_aes128_rejects_bad_widths() {
    use crate::util::Error;

    assert!(matches!(Aes128::new(b""), Err(Error::InvalidKeyLength { expected: 16, len: 0 })));
    assert!(matches!(Aes128::new(b"YELLOW SUBMARINE!"), Err(Error::InvalidKeyLength { .. })));

    let cipher = Aes128::new(b"YELLOW SUBMARINE").unwrap();
    let mut short = [0u8; 15];
    assert!(matches!(cipher.encrypt_block(&mut short), Err(Error::BlockWidth { expected: 16, len: 15 })));
    let mut long = [0u8; 17];
    assert!(matches!(cipher.decrypt_block(&mut long), Err(Error::BlockWidth { expected: 16, len: 17 })));
}

// Not a cipher in any meaningful sense. It only exists so the modes can be
// exercised at block widths other than AES's.
#[cfg(test)]
pub(crate) struct ToyCipher {
    pub key: Vec<u8>,
}

#[cfg(test)]
impl BlockCipher for ToyCipher {
    fn block_size(&self) -> usize {
        self.key.len()
    }

    fn encrypt_block(&self, block: &mut [u8]) -> Result<()> {
        ensure!(block.len() == self.key.len(), BlockWidthSnafu { expected: self.key.len(), len: block.len() });
        for (i, (b, k)) in block.iter_mut().zip(self.key.iter()).enumerate() {
            *b = (*b ^ k).rotate_left(3).wrapping_add(i as u8);
        }
        block.reverse();
        Ok(())
    }

    fn decrypt_block(&self, block: &mut [u8]) -> Result<()> {
        ensure!(block.len() == self.key.len(), BlockWidthSnafu { expected: self.key.len(), len: block.len() });
        block.reverse();
        for (i, (b, k)) in block.iter_mut().zip(self.key.iter()).enumerate() {
            *b = b.wrapping_sub(i as u8).rotate_right(3) ^ k;
        }
        Ok(())
    }
}

/// True iff two whole blocks of the ciphertext are byte-for-byte identical.
///
/// Only meaningful when the plaintext was long and repetitive enough for ECB
/// to leave duplicates behind (two or three blocks of one repeated byte).
pub fn looks_like_ecb(ciphertext: &[u8], block_size: usize) -> bool {
    ciphertext
        .chunks_exact(block_size)
        .tuple_combinations()
        .any(|(a, b): (&[u8], &[u8])| a == b)
}

#[test]
fn test_looks_like_ecb() {
    use crate::crypto::aes::cbc::aes_cbc_encrypt;
    use crate::crypto::aes::ecb::aes_ecb_encrypt;
    use crate::crypto::common::generate_random_bytes;

    let plaintext = [b'A'; 3 * BLOCK_SIZE];
    let mut false_positives = 0;
    for _ in 0..100 {
        let key: [u8; 16] = generate_random_bytes();
        let iv: [u8; 16] = generate_random_bytes();
        assert!(looks_like_ecb(&aes_ecb_encrypt(&plaintext, &key).unwrap(), BLOCK_SIZE));
        if looks_like_ecb(&aes_cbc_encrypt(&plaintext, &key, &iv).unwrap(), BLOCK_SIZE) {
            false_positives += 1;
        }
    }
    assert!(false_positives <= 1);

    assert!(!looks_like_ecb(b"aaabbbccc", 3));
    assert!(looks_like_ecb(b"aaabbbcccbbb", 3));
    // A trailing partial block is never compared
    assert!(!looks_like_ecb(b"aaabbba", 3));
}

// Given an oracle of type
// (fixed block encryption function) . (fixed lpad ++) . (++ fixed rpad)
// returns the block size, and the length of padding the oracle applied to
// the empty input (the filler length at which the output first grows).
pub fn determine_block_size_and_padding(oracle: &dyn Oracle) -> Result<(usize, usize)> {
    let initial_size = oracle(b"")?.len();
    let mut input: Vec<u8> = Vec::with_capacity(MAX_BLOCK_PROBE);
    while input.len() < MAX_BLOCK_PROBE {
        input.push(b'A');
        let size = oracle(&input)?.len();
        if size != initial_size {
            return Ok((size - initial_size, input.len()));
        }
    }
    SearchExhaustedSnafu { offset: input.len() }.fail()
}

pub fn determine_block_size(oracle: &dyn Oracle) -> Result<usize> {
    determine_block_size_and_padding(oracle).map(|(block_size, _)| block_size)
}

#[test]
fn test_determine_block_size_and_padding() {
    for suffix_len in 0..40 {
        let oracle = get_id_oracle()
            .pullback_add_left_padding(b"prefix")
            .pullback_add_right_padding(&vec![b'x'; suffix_len])
            .pushforward_pkcs_7(BLOCK_SIZE)
            .pushforward_ecb_encrypt_fixed_key();
        let (block_size, padding) = determine_block_size_and_padding(&oracle).unwrap();
        assert_eq!(BLOCK_SIZE, block_size);
        assert_eq!(BLOCK_SIZE - (6 + suffix_len) % BLOCK_SIZE, padding);
    }
}

// Given an oracle of the form:
// (fixed ECB or CBC) . (fixed lpad ++) . (++ fixed rpad)
// Determine whether the oracle is using ECB or CBC
pub fn detect_ecb_or_cbc(oracle: &dyn Oracle) -> Result<Option<bool>> {
    // If we pass a constant string of As, we will get a result which iterates
    // after the first block if ECB, and doesn't iterate in CBC
    let block_size = determine_block_size(oracle)?;

    // Take 4*block_size to ensure we aren't prevented by left or right padding
    let repeated_a = repeating_block(&oracle(&vec![b'A'; 4*block_size])?, block_size);
    let repeated_b = match repeated_a {
        Some(_) => repeating_block(&oracle(&vec![b'B'; 4*block_size])?, block_size),
        None    => return Ok(Some(false)), // No repeats at all. CBC
    };
    Ok(match (repeated_a, repeated_b) {
        (Some((_, a)), Some((_, b))) if a != b => Some(true), // Repeats track our input. ECB
        _ => None, // The repeat came from somewhere else, so we cannot tell
    })
}

#[test]
fn test_detect_ecb_or_cbc() {
    for _ in 0..100 {
        let (run_ecb, oracle) = random_mode_oracle();
        match detect_ecb_or_cbc(&oracle).unwrap() {
            Some(detected_is_ecb) => assert_eq!(run_ecb, detected_is_ecb),
            None                  => panic!("could not decide the mode"),
        };
    }
}
