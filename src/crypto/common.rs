use rand::RngCore;
use snafu::{ensure, OptionExt};
use std::collections::HashSet;

use crate::util::{InvalidPaddingSnafu, NotBlockAlignedSnafu, Result};

pub fn break_into_blocks(buf: &[u8], size: usize) -> Result<Vec<&[u8]>> {
    ensure!(size > 0 && buf.len() % size == 0, NotBlockAlignedSnafu { len: buf.len(), block_size: size });
    Ok(buf.chunks_exact(size).collect())
}

#[test]
fn test_break_into_blocks() {
    let blocks = break_into_blocks(b"aaabbbccc", 3).unwrap();
    assert_eq!(vec![b"aaa".as_slice(), b"bbb".as_slice(), b"ccc".as_slice()], blocks);
    assert!(break_into_blocks(b"aaabbbcc", 3).is_err());
    assert!(break_into_blocks(b"", 3).unwrap().is_empty());
}

pub fn join_blocks(blocks: &[&[u8]]) -> Vec<u8> {
    let total = blocks.iter().map(|b| b.len()).sum();
    let mut out = Vec::with_capacity(total);
    for block in blocks {
        out.extend_from_slice(block);
    }
    out
}

#[test]
fn test_join_blocks() {
    let buf = b"YELLOW SUBMARINEyellow submarine";
    let blocks = break_into_blocks(buf, 16).unwrap();
    assert_eq!(buf.to_vec(), join_blocks(&blocks));
}

pub fn repeating_block(arr: &[u8], size: usize) -> Option<(usize, Vec<u8>)> {
    let mut blocks: HashSet<&[u8]> = HashSet::new();
    for (idx, block) in arr.chunks_exact(size).enumerate() {
        if !blocks.insert(block) {
            return Some((idx, block.to_vec()));
        }
    }
    None
}

#[test]
fn test_repeating_block() {
    let arr = b"aaabbbcccaaa";
    assert_eq!(Some((3, b"aaa".to_vec())), repeating_block(arr, 3));
    assert_eq!(None,                       repeating_block(arr, 4));
}

// Every index `i` whose block is immediately repeated at `i + 1`, in order
pub fn adjacent_repeating_blocks(arr: &[u8], size: usize) -> impl Iterator<Item = usize> + '_ {
    arr.chunks_exact(size)
        .zip(arr.chunks_exact(size).skip(1))
        .enumerate()
        .filter(|(_, (a, b))| a == b)
        .map(|(idx, _)| idx)
}

pub fn adjacent_repeating_block(arr: &[u8], size: usize) -> Option<usize> {
    adjacent_repeating_blocks(arr, size).next()
}

#[test]
fn test_adjacent_repeating_block() {
    assert_eq!(Some(1), adjacent_repeating_block(b"aaabbbbbbccc", 3));
    // Repeats that are not neighbours do not count
    assert_eq!(None, adjacent_repeating_block(b"aaabbbaaa", 3));
    assert_eq!(Some(0), adjacent_repeating_block(b"xxxxxxx", 3));

    let all: Vec<usize> = adjacent_repeating_blocks(b"aaaaaabbbcccccc", 3).collect();
    assert_eq!(vec![0, 3], all);
    assert_eq!(0, adjacent_repeating_blocks(b"aaabbbaaa", 3).count());
}

pub fn round_up_to_nearest_multiple(n: usize, m: usize) -> usize {
    m*( (n + (m-1)) / m )
}

// Always appends at least one byte, so an aligned buffer gains a whole block
// of `block_size`. Padding can therefore always be stripped unambiguously.
pub fn pad_pkcs_7(buf: &[u8], block_size: usize) -> Vec<u8> {
    assert!((1..=255).contains(&block_size), "PKCS#7 block size must be in 1..=255");
    let padding_length = block_size - buf.len() % block_size;
    let mut out = Vec::with_capacity(buf.len() + padding_length);
    out.extend_from_slice(buf);
    out.resize(buf.len() + padding_length, padding_length as u8);
    out
}

#[test]
fn test_pad_pkcs_7() {
    let case = b"YELLOW SUBMARINE";
    let expected = b"YELLOW SUBMARINE\x04\x04\x04\x04".to_vec();
    let result = pad_pkcs_7(case, 20);
    assert_eq!(expected, result);

    let expected_2 = [
        case.to_vec(),
        vec![16; 16],
    ].concat();
    let result_2 = pad_pkcs_7(case, case.len());
    assert_eq!(expected_2, result_2);

    assert_eq!(vec![1u8], pad_pkcs_7(b"", 1));
    assert_eq!(vec![3u8; 3], pad_pkcs_7(b"", 3));
}

pub fn strip_pad_pkcs_7(buf: &[u8]) -> Result<Vec<u8>> {
    let &final_byte = buf.last().context(InvalidPaddingSnafu)?;
    let padding_len = final_byte as usize;
    ensure!(padding_len != 0 && padding_len <= buf.len(), InvalidPaddingSnafu);
    let unpadded_len = buf.len() - padding_len;
    ensure!(buf[unpadded_len..].iter().all(|&b| b == final_byte), InvalidPaddingSnafu);
    Ok(buf[..unpadded_len].to_vec())
}

pub fn has_valid_padding(buf: &[u8]) -> bool {
    strip_pad_pkcs_7(buf).is_ok()
}

#[test]
fn test_strip_pad_pkcs_7() {
    use crate::util::Error;

    let case = b"YELLOW SUBMARINE\x04\x04\x04\x04";
    let expected = b"YELLOW SUBMARINE".to_vec();
    let result = strip_pad_pkcs_7(case).unwrap();
    assert_eq!(expected, result);

    let case_2 = [b"YELLOW SUBMARINE".as_slice(), [16u8; 16].as_slice()].concat();
    assert_eq!(expected, strip_pad_pkcs_7(&case_2).unwrap());

    // Cases from Challenge 15
    let case_4 = b"ICE ICE BABY\x04\x04\x04\x04";
    let expected_4 = b"ICE ICE BABY".to_vec();
    assert_eq!(expected_4, strip_pad_pkcs_7(case_4).unwrap());

    let case_5 = b"ICE ICE BABY\x05\x05\x05\x05";
    assert!(matches!(strip_pad_pkcs_7(case_5), Err(Error::InvalidPadding {})));

    let case_6 = b"ICE ICE BABY\x01\x02\x03\x04";
    assert!(matches!(strip_pad_pkcs_7(case_6), Err(Error::InvalidPadding {})));

    // Zero is never a padding length, and the claimed length must fit
    assert!(strip_pad_pkcs_7(b"ICE ICE BABY\x00").is_err());
    assert!(strip_pad_pkcs_7(b"\x03\x03").is_err());
    assert!(strip_pad_pkcs_7(b"").is_err());
    assert_eq!(Vec::<u8>::new(), strip_pad_pkcs_7(b"\x02\x02").unwrap());

    assert!(has_valid_padding(b"ICE ICE BABY\x01"));
    assert!(!has_valid_padding(b"ICE ICE BABY\x02"));
}

#[test]
fn test_pad_then_strip() {
    let buf: Vec<u8> = (0u8..=64).collect();
    for block_size in 1..=40 {
        for len in 0..buf.len() {
            let padded = pad_pkcs_7(&buf[..len], block_size);
            assert_eq!(0, padded.len() % block_size);
            assert!(padded.len() > len);
            assert_eq!(buf[..len].to_vec(), strip_pad_pkcs_7(&padded).unwrap());
        }
    }
}

pub fn generate_random_bytes<const N: usize>() -> [u8; N] {
    let mut data = [0u8; N];
    rand::thread_rng().fill_bytes(&mut data);
    data
}

pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut data);
    data
}
