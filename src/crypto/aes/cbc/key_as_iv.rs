use snafu::ensure;
use tracing::{debug, instrument};

use crate::crypto::aes::{Aes128, BLOCK_SIZE};
use crate::crypto::aes::cbc::{cbc_decrypt, cbc_encrypt};
use crate::crypto::common::{break_into_blocks, generate_random_bytes, pad_pkcs_7};
use crate::crypto::xor::fixed_xor;
use crate::util::{Error, KeyRecoveryFailedSnafu, NonAsciiSnafu, Result};

/// CBC where the key doubles as the IV. The receiving side complains about
/// high-ASCII plaintext by echoing the plaintext back.
pub struct KeyAsIvOracle {
    cipher: Aes128,
    key: [u8; BLOCK_SIZE],
}

impl KeyAsIvOracle {
    pub fn new() -> Self {
        Self::from_key(generate_random_bytes())
    }

    pub fn from_key(key: [u8; BLOCK_SIZE]) -> Self {
        Self { cipher: Aes128::from(key), key }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        cbc_encrypt(&self.cipher, &pad_pkcs_7(plaintext, BLOCK_SIZE), &self.key)
    }

    pub fn check(&self, ciphertext: &[u8]) -> Result<()> {
        let plaintext = cbc_decrypt(&self.cipher, ciphertext, &self.key)?;
        ensure!(plaintext.is_ascii(), NonAsciiSnafu { plaintext });
        Ok(())
    }
}

impl Default for KeyAsIvOracle {
    fn default() -> Self {
        Self::new()
    }
}

// With C1 || 0 || C1 the first and third plaintext blocks come from the same
// decryption, one XORed with the IV (the key) and one with zeros.
#[instrument(skip_all)]
pub fn attack_key_as_iv(ciphertext: &[u8], oracle: &KeyAsIvOracle) -> Result<Vec<u8>> {
    let blocks = break_into_blocks(ciphertext, BLOCK_SIZE)?;
    for (idx, block) in blocks.iter().enumerate() {
        let payload = [*block, [0u8; BLOCK_SIZE].as_slice(), *block].concat();
        match oracle.check(&payload) {
            Ok(()) => continue,
            Err(Error::NonAscii { plaintext }) => {
                debug!(block = idx, "oracle leaked plaintext");
                let first = &plaintext[..BLOCK_SIZE];
                let third = &plaintext[2*BLOCK_SIZE..3*BLOCK_SIZE];
                return fixed_xor(first, third);
            }
            Err(e) => return Err(e),
        }
    }
    KeyRecoveryFailedSnafu.fail()
}

#[test]
fn test_check_rejects_high_ascii() {
    let oracle = KeyAsIvOracle::new();
    let ciphertext = oracle.encrypt(b"plain old ascii text").unwrap();
    assert!(oracle.check(&ciphertext).is_ok());

    let ciphertext = oracle.encrypt(b"caf\xc3\xa9 au lait").unwrap();
    match oracle.check(&ciphertext) {
        Err(Error::NonAscii { plaintext }) => assert!(plaintext.starts_with(b"caf\xc3\xa9")),
        other => panic!("expected a complaint, got {:?}", other),
    }
}

#[test]
fn test_attack_key_as_iv() {
    use crate::crypto::aes::cbc::aes_cbc_decrypt;
    use crate::crypto::common::strip_pad_pkcs_7;

    crate::util::init_tracing();

    for _ in 0..10 {
        let key: [u8; BLOCK_SIZE] = generate_random_bytes();
        let oracle = KeyAsIvOracle::from_key(key);
        let message = b"comment1=cooking%20MCs;userdata=nothing to see here";
        let ciphertext = oracle.encrypt(message).unwrap();

        let recovered = attack_key_as_iv(&ciphertext, &oracle).unwrap();
        assert_eq!(key.to_vec(), recovered);
        let decrypted = aes_cbc_decrypt(&ciphertext, &recovered, &recovered).unwrap();
        assert_eq!(message.to_vec(), strip_pad_pkcs_7(&decrypted).unwrap());
    }
}

#[test]
fn test_attack_key_as_iv_needs_a_block() {
    let oracle = KeyAsIvOracle::new();
    assert!(matches!(attack_key_as_iv(b"", &oracle), Err(Error::KeyRecoveryFailed {})));
}
