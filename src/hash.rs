use std::marker::PhantomData;
use rand::Rng;
use tracing::{debug, instrument};

use crate::crypto::common::random_bytes;
use crate::util::{ForgeryFailedSnafu, Result};

pub mod md4;
pub mod sha1;

pub use md4::Md4;
pub use sha1::Sha1;

pub const BLOCK_LEN: usize = 64;

/// Longest secret prefix `forge_length_extension` is asked to guess by default
pub const MAX_KEY_LEN: usize = 64;

/// A hash built by iterating a compression function over 64-byte blocks,
/// whose digest is its entire chaining state. That last property is what
/// lets `from_digest` pick up where someone else's hash left off.
pub trait MerkleDamgard: Sized {
    type Digest: Copy + Eq + AsRef<[u8]> + std::fmt::Debug;

    fn new() -> Self;

    /// Resumes from a published digest as if `processed_len` bytes (a
    /// multiple of the block length, padding included) had been hashed.
    fn from_digest(digest: &Self::Digest, processed_len: u64) -> Self;

    fn update(&mut self, data: &[u8]);

    fn finalize(self) -> Self::Digest;

    /// The bytes appended to a `message_len`-byte message before the final
    /// compression.
    fn padding(message_len: u64) -> Vec<u8>;

    fn digest(data: &[u8]) -> Self::Digest {
        let mut hasher = Self::new();
        hasher.update(data);
        hasher.finalize()
    }
}

// 0x80, zeros up to 56 mod 64, then the message length in bits
pub(crate) fn md_padding(message_len: u64, big_endian: bool) -> Vec<u8> {
    let zeros = (BLOCK_LEN + 55 - (message_len as usize % BLOCK_LEN)) % BLOCK_LEN;
    let bit_len = message_len.wrapping_mul(8);
    let mut out = Vec::with_capacity(1 + zeros + 8);
    out.push(0x80);
    out.resize(1 + zeros, 0);
    if big_endian {
        out.extend_from_slice(&bit_len.to_be_bytes());
    } else {
        out.extend_from_slice(&bit_len.to_le_bytes());
    }
    out
}

#[test]
fn test_md_padding() {
    for len in 0..200u64 {
        let padding = md_padding(len, true);
        assert_eq!(0, (len as usize + padding.len()) % BLOCK_LEN);
        assert!(padding.len() >= 9 && padding.len() <= BLOCK_LEN + 8);
        assert_eq!(0x80, padding[0]);
        assert_eq!((len * 8).to_be_bytes(), padding[padding.len() - 8..]);
        assert_eq!((len * 8).to_le_bytes(), md_padding(len, false)[padding.len() - 8..]);
    }
}

/// Bytes waiting for a full block, plus the running message length.
#[derive(Clone, Default)]
pub(crate) struct BlockBuffer {
    pending: Vec<u8>,
    len: u64,
}

impl BlockBuffer {
    pub(crate) fn resume(processed_len: u64) -> Self {
        Self { pending: Vec::with_capacity(BLOCK_LEN), len: processed_len }
    }

    pub(crate) fn len(&self) -> u64 {
        self.len
    }

    pub(crate) fn update(&mut self, data: &[u8], mut compress: impl FnMut(&[u8])) {
        self.len = self.len.wrapping_add(data.len() as u64);
        self.pending.extend_from_slice(data);
        let full = self.pending.len() / BLOCK_LEN * BLOCK_LEN;
        self.pending[..full]
            .chunks_exact(BLOCK_LEN)
            .for_each(&mut compress);
        self.pending.drain(..full);
    }
}

/// `H(key || message)`, which is not a MAC anyone should use.
pub struct SecretPrefixMac<H> {
    key: Vec<u8>,
    _hash: PhantomData<H>,
}

impl<H: MerkleDamgard> SecretPrefixMac<H> {
    /// A random key between 5 and 24 bytes long
    pub fn new() -> Self {
        let key_len = rand::thread_rng().gen_range(5..25);
        Self::with_key(&random_bytes(key_len))
    }

    pub fn with_key(key: &[u8]) -> Self {
        Self { key: key.to_vec(), _hash: PhantomData }
    }

    pub fn sign(&self, message: &[u8]) -> H::Digest {
        let mut hasher = H::new();
        hasher.update(&self.key);
        hasher.update(message);
        hasher.finalize()
    }

    pub fn verify(&self, message: &[u8], mac: &H::Digest) -> bool {
        self.sign(message) == *mac
    }
}

impl<H: MerkleDamgard> Default for SecretPrefixMac<H> {
    fn default() -> Self {
        Self::new()
    }
}

/// Appends `suffix` to a signed message without knowing the key, guessing
/// every key length up to `max_key_len`. Returns the forged message (with
/// the original glue padding inside it) and its MAC.
#[instrument(skip_all)]
pub fn forge_length_extension<H: MerkleDamgard>(
    oracle: &SecretPrefixMac<H>,
    message: &[u8],
    mac: &H::Digest,
    suffix: &[u8],
    max_key_len: usize,
) -> Result<(Vec<u8>, H::Digest)> {
    for key_len in 0..=max_key_len {
        let signed_len = (key_len + message.len()) as u64;
        let glue = H::padding(signed_len);
        let mut hasher = H::from_digest(mac, signed_len + glue.len() as u64);
        hasher.update(suffix);
        let forged_mac = hasher.finalize();

        let forged_message = [message, glue.as_slice(), suffix].concat();
        if oracle.verify(&forged_message, &forged_mac) {
            debug!(key_len, "forgery accepted");
            return Ok((forged_message, forged_mac));
        }
    }
    ForgeryFailedSnafu { max_key_len }.fail()
}

#[cfg(test)]
use crate::crypto::oracle::contains_admin;

#[cfg(test)]
const MESSAGE: &[u8] = b"comment1=cooking%20MCs;userdata=foo;comment2=%20like%20a%20pound%20of%20bacon";
#[cfg(test)]
const SUFFIX: &[u8] = b";admin=true;";

#[cfg(test)]
fn check_forgery<H: MerkleDamgard>() {
    for _ in 0..5 {
        let oracle = SecretPrefixMac::<H>::new();
        let mac = oracle.sign(MESSAGE);
        assert!(oracle.verify(MESSAGE, &mac));

        let (forged, forged_mac) = forge_length_extension(&oracle, MESSAGE, &mac, SUFFIX, MAX_KEY_LEN).unwrap();
        assert!(forged.starts_with(MESSAGE));
        assert!(forged.ends_with(SUFFIX));
        assert!(contains_admin(&forged));
        assert!(oracle.verify(&forged, &forged_mac));
    }
}

#[test]
fn test_sha1_length_extension() {
    crate::util::init_tracing();
    check_forgery::<Sha1>();
}

#[test]
fn test_md4_length_extension() {
    crate::util::init_tracing();
    check_forgery::<Md4>();
}

#[test]
fn test_length_extension_needs_key_length() {
    use crate::util::Error;

    let oracle = SecretPrefixMac::<Sha1>::with_key(&[7u8; 30]);
    let mac = oracle.sign(MESSAGE);
    let result = forge_length_extension(&oracle, MESSAGE, &mac, SUFFIX, 20);
    assert!(matches!(result, Err(Error::ForgeryFailed { max_key_len: 20 })));
    assert!(forge_length_extension(&oracle, MESSAGE, &mac, SUFFIX, 30).is_ok());
}

#[test]
fn test_mac_rejects_tampering() {
    let oracle = SecretPrefixMac::<Md4>::new();
    let mac = oracle.sign(MESSAGE);
    assert!(!oracle.verify(b"comment1=cooking%20MCs;userdata=fop", &mac));
    assert!(!oracle.verify(&[MESSAGE, SUFFIX].concat(), &mac));
}
