use snafu::OptionExt;
use tracing::{debug, instrument};

use crate::crypto::aes::Aes128;
use crate::crypto::aes::ctr::{ctr_apply, NONCE_SIZE};
use crate::crypto::common::generate_random_bytes;
use crate::crypto::oracle::*;
use crate::util::{Result, SearchExhaustedSnafu};

/// The comment service again, this time under CTR. Nothing is padded, so the
/// ciphertext is exactly as long as the wrapped comment.
pub struct CtrCommentOracle {
    cipher: Aes128,
    nonce: [u8; NONCE_SIZE],
}

impl CtrCommentOracle {
    pub fn new() -> Self {
        Self {
            cipher: Aes128::from(generate_random_bytes()),
            nonce: generate_random_bytes(),
        }
    }
}

impl Default for CtrCommentOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl CommentOracle for CtrCommentOracle {
    fn encrypt_userdata(&self, userdata: &[u8]) -> Result<Vec<u8>> {
        ctr_apply(&self.cipher, &wrap_userdata(userdata), &self.nonce)
    }

    fn is_admin(&self, ciphertext: &[u8]) -> Result<bool> {
        let plaintext = ctr_apply(&self.cipher, ciphertext, &self.nonce)?;
        Ok(contains_admin(&plaintext))
    }
}

/// Encrypts the placeholder as userdata. Returns the ciphertext and the
/// offset the placeholder sits at.
pub fn ctr_bitflip_payload(oracle: &dyn CommentOracle) -> Result<(Vec<u8>, usize)> {
    let with_a = oracle.encrypt_userdata(b"A")?;
    let with_b = oracle.encrypt_userdata(b"B")?;
    let userdata_start = with_a.iter()
        .zip(with_b.iter())
        .position(|(a, b)| a != b)
        .context(SearchExhaustedSnafu { offset: 0usize })?;
    debug!(userdata_start, "located userdata");
    Ok((oracle.encrypt_userdata(ADMIN_PLACEHOLDER)?, userdata_start))
}

// In CTR a flipped ciphertext bit flips the same plaintext bit and nothing
// else, so the placeholder is corrected where it sits.
#[instrument(skip_all)]
pub fn attack_ctr_bitflip(oracle: &dyn CommentOracle) -> Result<Vec<u8>> {
    let (mut ciphertext, offset) = ctr_bitflip_payload(oracle)?;
    flip_placeholder(&mut ciphertext, offset)?;
    Ok(ciphertext)
}

#[test]
fn test_ctr_comment_oracle_refuses_direct_admin() {
    let oracle = CtrCommentOracle::new();
    let ciphertext = oracle.encrypt_userdata(ADMIN_TOKEN).unwrap();
    assert!(!oracle.is_admin(&ciphertext).unwrap());

    // No padding in CTR
    let ciphertext = oracle.encrypt_userdata(b"x").unwrap();
    assert_eq!(COMMENT_PREFIX.len() + 1 + COMMENT_SUFFIX.len(), ciphertext.len());
}

#[test]
fn test_attack_ctr_bitflip() {
    crate::util::init_tracing();

    for _ in 0..10 {
        let oracle = CtrCommentOracle::new();
        let (mut ciphertext, offset) = ctr_bitflip_payload(&oracle).unwrap();
        assert_eq!(COMMENT_PREFIX.len(), offset);
        assert!(!oracle.is_admin(&ciphertext).unwrap());

        flip_placeholder(&mut ciphertext, offset).unwrap();
        assert!(oracle.is_admin(&ciphertext).unwrap());

        let forged = attack_ctr_bitflip(&oracle).unwrap();
        assert_eq!(ciphertext.len(), forged.len());
        assert!(oracle.is_admin(&forged).unwrap());
    }
}
