use std::collections::HashMap;
use snafu::{ensure, OptionExt};
use tracing::{debug, instrument, trace};

use crate::crypto::aes::{determine_block_size_and_padding, looks_like_ecb};
use crate::crypto::common::{adjacent_repeating_blocks, strip_pad_pkcs_7};
use crate::crypto::oracle::*;
use crate::util::{NotEcbSnafu, Result, SearchExhaustedSnafu};

const ALIGN_BYTE: u8 = 0;
const FILLER: u8 = b'A';
const OTHER_FILLER: u8 = b'B';

/// Where our input lands inside `ECB(pad(prefix || input || suffix))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EcbLayout {
    pub block_size: usize,
    /// Bytes needed to finish the block the prefix ends in
    pub align: usize,
    /// First block made up entirely of our input, once aligned
    pub our_start: usize,
    pub prefix_len: usize,
    pub suffix_len: usize,
}

fn filler_ciphertext(oracle: &dyn Oracle, block_size: usize, align: usize, filler: u8) -> Result<Vec<u8>> {
    let payload = [
        vec![ALIGN_BYTE; align],
        vec![filler; 2*block_size],
    ].concat();
    oracle(&payload)
}

// First block index where both ciphertexts repeat a block and the repeated
// block differs between them. Pairs coming from the prefix or suffix encrypt
// the same whatever the filler, so they are passed over.
fn filler_pair(with_a: &[u8], with_b: &[u8], block_size: usize) -> Option<usize> {
    let block = |buf: &[u8], idx: usize| buf[idx*block_size..(idx + 1)*block_size].to_vec();
    adjacent_repeating_blocks(with_a, block_size)
        .filter(|&idx| adjacent_repeating_blocks(with_b, block_size).any(|j| j == idx))
        .find(|&idx| block(with_a, idx) != block(with_b, idx))
}

pub fn discover_layout(oracle: &dyn Oracle) -> Result<EcbLayout> {
    let (block_size, jump_filler) = determine_block_size_and_padding(oracle)?;
    let unknown_len = oracle(b"")?.len() - jump_filler;
    debug!(block_size, unknown_len, "measured oracle");

    let zeros = oracle(&vec![ALIGN_BYTE; 3*block_size])?;
    ensure!(looks_like_ecb(&zeros, block_size), NotEcbSnafu);

    for align in 0..block_size {
        let with_a = filler_ciphertext(oracle, block_size, align, FILLER)?;
        let with_b = filler_ciphertext(oracle, block_size, align, OTHER_FILLER)?;
        let Some(our_start) = filler_pair(&with_a, &with_b, block_size) else {
            continue;
        };
        let prefix_len = our_start*block_size - align;
        let suffix_len = unknown_len.checked_sub(prefix_len).context(NotEcbSnafu)?;
        let layout = EcbLayout { block_size, align, our_start, prefix_len, suffix_len };
        debug!(?layout, "aligned to block boundary");
        return Ok(layout);
    }
    NotEcbSnafu.fail()
}

/// Recovers the hidden suffix of an oracle computing
/// `ECB(key, pad(prefix || input || suffix))`, for any fixed prefix.
#[instrument(skip_all)]
pub fn attack_aes_ecb_byte_by_byte(oracle: &dyn Oracle) -> Result<Vec<u8>> {
    let EcbLayout { block_size, align, our_start, suffix_len, .. } = discover_layout(oracle)?;
    let align_bytes = vec![ALIGN_BYTE; align];

    // Once aligned, the suffix is followed by its own padding
    let trailer_len = block_size - suffix_len % block_size;
    let total_len = suffix_len + trailer_len;

    // Filler then everything recovered so far; the lookup window slides along it
    let mut known = vec![FILLER; block_size - 1];
    known.reserve(total_len);

    for k in 0..total_len {
        if k >= suffix_len {
            known.push(trailer_len as u8);
            continue;
        }
        let target_block = our_start + k / block_size;
        if k % block_size == 0 {
            trace!(block = target_block, "recovering block");
        }

        let window = &known[k..k + block_size - 1];
        let lookup = (0..=u8::MAX)
            .map(|b| -> Result<(Vec<u8>, u8)> {
                let payload = [align_bytes.as_slice(), window, std::slice::from_ref(&b)].concat();
                let ciphertext = oracle(&payload)?;
                Ok((ciphertext[our_start*block_size..(our_start + 1)*block_size].to_vec(), b))
            })
            .collect::<Result<HashMap<Vec<u8>, u8>>>()?;

        let filler_len = block_size - 1 - k % block_size;
        let payload = [align_bytes.as_slice(), &known[..filler_len]].concat();
        let ciphertext = oracle(&payload)?;
        let block = &ciphertext[target_block*block_size..(target_block + 1)*block_size];
        let &b = lookup.get(block).context(SearchExhaustedSnafu { offset: k })?;
        known.push(b);
    }

    strip_pad_pkcs_7(&known[block_size - 1..])
}

#[cfg(test)]
use base64::{Engine as _, engine::general_purpose};
#[cfg(test)]
use lazy_static::lazy_static;
#[cfg(test)]
use crate::crypto::common::random_bytes;

#[cfg(test)]
lazy_static! {
    static ref UNKNOWN: Vec<u8> = general_purpose::STANDARD
        .decode("Um9sbGluJyBpbiBteSA1LjAKV2l0aCBteSByYWctdG9wIGRvd24gc28gbXkgaGFpciBjYW4gYmxvdwpUaGUgZ2lybGllcyBvbiBzdGFuZGJ5IHdhdmluZyBqdXN0IHRvIHNheSBoaQpEaWQgeW91IHN0b3A/IE5vLCBJIGp1c3QgZHJvdmUgYnkK")
        .expect("Base64 decoding failed");
}

#[cfg(test)]
fn ecb_oracle(prefix: &[u8], suffix: &[u8]) -> Box<dyn Oracle> {
    get_id_oracle()
        .pullback_add_left_padding(prefix)
        .pullback_add_right_padding(suffix)
        .pushforward_pkcs_7(16)
        .pushforward_ecb_encrypt_fixed_key()
}

#[test]
fn test_attack_aes_ecb_byte_by_byte_no_prefix() {
    crate::util::init_tracing();

    let expected = b"Rollin' in my 5.0\nWith my rag-top down so my hair can blow\nThe girlies on standby waving just to say hi\nDid you stop? No, I just drove by\n".to_vec();
    assert_eq!(expected, *UNKNOWN);

    let oracle = ecb_oracle(b"", &UNKNOWN);
    let result = attack_aes_ecb_byte_by_byte(&oracle).unwrap();
    assert_eq!(expected, result);
}

#[test]
fn test_attack_aes_ecb_byte_by_byte() {
    crate::util::init_tracing();

    for _ in 0..5 {
        let oracle = get_id_oracle()
            .pullback_add_random_left_padding::<0, 199>()
            .pullback_add_right_padding(&UNKNOWN)
            .pushforward_pkcs_7(16)
            .pushforward_ecb_encrypt_fixed_key();

        let result = attack_aes_ecb_byte_by_byte(&oracle).unwrap();
        assert_eq!(*UNKNOWN, result);
    }
}

#[test]
fn test_discover_layout() {
    for prefix_len in [0usize, 1, 15, 16, 17, 47] {
        let oracle = ecb_oracle(&random_bytes(prefix_len), b"secret");
        let layout = discover_layout(&oracle).unwrap();
        assert_eq!(16, layout.block_size);
        assert_eq!(prefix_len, layout.prefix_len);
        assert_eq!(6, layout.suffix_len);
        assert_eq!((16 - prefix_len % 16) % 16, layout.align);
        assert_eq!((prefix_len + 15) / 16, layout.our_start);
    }
}

#[test]
fn test_prefix_ending_in_filler() {
    // A prefix that already ends in the filler byte must not shift the alignment
    for tail in 1..16 {
        let prefix = [random_bytes(20), vec![FILLER; tail]].concat();
        let oracle = ecb_oracle(&prefix, b"hidden message");
        assert_eq!(prefix.len(), discover_layout(&oracle).unwrap().prefix_len);
        assert_eq!(b"hidden message".to_vec(), attack_aes_ecb_byte_by_byte(&oracle).unwrap());
    }
}

#[test]
fn test_prefix_with_repeated_blocks() {
    // The prefix's own duplicate comes first and is the same for both fillers
    let prefixes = [
        vec![b'x'; 32],
        [random_bytes(5), vec![0; 40]].concat(),
        [random_bytes(11), vec![b'A'; 48]].concat(),
    ];
    for prefix in prefixes {
        let oracle = ecb_oracle(&prefix, b"hidden message");
        assert_eq!(prefix.len(), discover_layout(&oracle).unwrap().prefix_len);
        assert_eq!(b"hidden message".to_vec(), attack_aes_ecb_byte_by_byte(&oracle).unwrap());
    }
}

#[test]
fn test_suffix_padding_boundaries() {
    // Trailers of 16, 1 and 15 bytes, and a suffix that repeats whole blocks
    let suffixes = [
        vec![],
        vec![b'x'; 15],
        vec![b'y'; 32],
        vec![b'z'; 17],
        b"\x01\x01\x01".to_vec(),
    ];
    for suffix in suffixes {
        let oracle = ecb_oracle(&random_bytes(7), &suffix);
        assert_eq!(suffix, attack_aes_ecb_byte_by_byte(&oracle).unwrap());
    }
}

#[test]
fn test_refuses_cbc_oracle() {
    use crate::util::Error;

    let oracle = get_id_oracle()
        .pullback_add_right_padding(&UNKNOWN)
        .pushforward_pkcs_7(16)
        .pushforward_cbc_encrypt_fixed_key();
    assert!(matches!(attack_aes_ecb_byte_by_byte(&oracle), Err(Error::NotEcb {})));
}
