use snafu::ensure;
use tracing::{debug, instrument};

use crate::crypto::aes::Aes128;
use crate::crypto::aes::ctr::{ctr_apply, NONCE_SIZE};
use crate::crypto::common::generate_random_bytes;
use crate::crypto::xor::fixed_xor;
use crate::util::{OffsetOutOfRangeSnafu, Result};

/// A service that lets callers rewrite part of a CTR ciphertext without
/// ever seeing the key: "seek" into the stream and re-encrypt in place.
pub struct CtrEditOracle {
    cipher: Aes128,
    nonce: [u8; NONCE_SIZE],
}

impl CtrEditOracle {
    pub fn new() -> Self {
        Self {
            cipher: Aes128::from(generate_random_bytes()),
            nonce: generate_random_bytes(),
        }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        ctr_apply(&self.cipher, plaintext, &self.nonce)
    }

    /// Replaces the plaintext at `offset..offset + newtext.len()` with
    /// `newtext`, writing the re-encrypted bytes into `ciphertext`. The edit
    /// must lie inside the existing ciphertext.
    pub fn edit(&self, ciphertext: &mut [u8], offset: usize, newtext: &[u8]) -> Result<()> {
        let len = ciphertext.len();
        ensure!(
            offset <= len && newtext.len() <= len - offset,
            OffsetOutOfRangeSnafu { offset, len }
        );
        let end = offset + newtext.len();
        let keystream = ctr_apply(&self.cipher, &vec![0u8; end], &self.nonce)?;
        ciphertext[offset..end]
            .iter_mut()
            .zip(keystream[offset..].iter().zip(newtext))
            .for_each(|(c, (k, p))| *c = k ^ p);
        Ok(())
    }
}

impl Default for CtrEditOracle {
    fn default() -> Self {
        Self::new()
    }
}

// Editing in zeros makes the service hand back its own keystream.
#[instrument(skip_all)]
pub fn attack_ctr_edit(ciphertext: &[u8], oracle: &CtrEditOracle) -> Result<Vec<u8>> {
    let mut keystream = ciphertext.to_vec();
    oracle.edit(&mut keystream, 0, &vec![0u8; ciphertext.len()])?;
    debug!(len = keystream.len(), "recovered keystream");
    fixed_xor(ciphertext, &keystream)
}

#[test]
fn test_ctr_edit() {
    let oracle = CtrEditOracle::new();
    let mut ciphertext = oracle.encrypt(b"the quick brown fox jumps over the lazy dog").unwrap();
    oracle.edit(&mut ciphertext, 4, b"QUICK").unwrap();
    oracle.edit(&mut ciphertext, 40, b"cat").unwrap();
    oracle.edit(&mut ciphertext, 10, b"").unwrap();
    assert_eq!(
        b"the QUICK brown fox jumps over the lazy cat".to_vec(),
        oracle.encrypt(&ciphertext).unwrap()
    );
}

#[test]
fn test_ctr_edit_out_of_range() {
    use crate::util::Error;

    let oracle = CtrEditOracle::new();
    let mut ciphertext = oracle.encrypt(b"twelve bytes").unwrap();
    let before = ciphertext.clone();
    assert!(matches!(
        oracle.edit(&mut ciphertext, 13, b""),
        Err(Error::OffsetOutOfRange { offset: 13, len: 12 })
    ));
    assert!(oracle.edit(&mut ciphertext, 10, b"abc").is_err());
    assert!(oracle.edit(&mut ciphertext, usize::MAX, b"a").is_err());
    assert_eq!(before, ciphertext);
    // Touching the very end is fine
    assert!(oracle.edit(&mut ciphertext, 12, b"").is_ok());
}

#[test]
fn test_attack_ctr_edit() {
    use crate::crypto::common::random_bytes;

    crate::util::init_tracing();

    let oracle = CtrEditOracle::new();
    for len in [0usize, 1, 15, 16, 17, 100] {
        let plaintext = random_bytes(len);
        let ciphertext = oracle.encrypt(&plaintext).unwrap();
        assert_eq!(plaintext, attack_ctr_edit(&ciphertext, &oracle).unwrap());
    }
}
