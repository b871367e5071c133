use std::collections::HashMap;
use snafu::OptionExt;
use tracing::{debug, instrument};

use crate::util::{self, NotEcbSnafu, ParseSnafu, Result};
use crate::crypto::aes::{determine_block_size, Aes128, BLOCK_SIZE};
use crate::crypto::aes::ecb::{ecb_decrypt, ecb_encrypt};
use crate::crypto::common::{
    generate_random_bytes,
    pad_pkcs_7,
    repeating_block,
    round_up_to_nearest_multiple,
    strip_pad_pkcs_7,
};
use crate::crypto::oracle::*;

#[derive(Debug, PartialEq)]
pub struct Profile {
    pub email: Vec<u8>,
    pub uid: Vec<u8>,
    pub role: Vec<u8>,
}

impl Profile {
    // Metacharacters are eaten, so an email cannot smuggle in its own fields
    pub fn from_email(buf: &[u8]) -> Profile {
        let safe_buf = buf.iter()
            .copied()
            .filter(|&x| !(x == b'=' || x == b'&'))
            .collect();
        Profile {
            email: safe_buf,
            uid: b"10".to_vec(),
            role: b"user".to_vec(),
        }
    }

    pub fn from_hashmap(mut hashmap: HashMap<Vec<u8>, Vec<u8>>) -> Result<Profile> {
        Ok(Profile {
            email: hashmap.remove(b"email".as_slice()).context(ParseSnafu)?,
            uid: hashmap.remove(b"uid".as_slice()).context(ParseSnafu)?,
            role: hashmap.remove(b"role".as_slice()).context(ParseSnafu)?,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        [
            b"email=".as_slice(), self.email.as_slice(),
            b"&".as_slice(),
            b"uid=".as_slice(),   self.uid.as_slice(),
            b"&".as_slice(),
            b"role=".as_slice(),  self.role.as_slice(),
        ].concat()
    }
}

pub fn profile_for(email: &[u8]) -> Vec<u8> {
    Profile::from_email(email).encode()
}

#[test]
fn test_profile_for() {
    assert_eq!(b"email=foo@bar.com&uid=10&role=user".to_vec(), profile_for(b"foo@bar.com"));
    assert_eq!(b"email=foo@bar.comroleadmin&uid=10&role=user".to_vec(), profile_for(b"foo@bar.com&role=admin"));

    let parsed = util::key_equals_val_parse(&profile_for(b"foo@bar.com")).unwrap();
    let profile = Profile::from_hashmap(parsed).unwrap();
    assert_eq!(Profile::from_email(b"foo@bar.com"), profile);
}

/// Issues ECB-encrypted profiles and reads roles back out of them.
pub struct ProfileOracle {
    cipher: Aes128,
}

impl ProfileOracle {
    pub fn new() -> Self {
        Self { cipher: Aes128::from(generate_random_bytes()) }
    }

    pub fn encrypt_profile_for(&self, email: &[u8]) -> Result<Vec<u8>> {
        ecb_encrypt(&self.cipher, &pad_pkcs_7(&profile_for(email), BLOCK_SIZE))
    }

    pub fn decrypt_profile(&self, ciphertext: &[u8]) -> Result<Profile> {
        let plaintext = strip_pad_pkcs_7(&ecb_decrypt(&self.cipher, ciphertext)?)?;
        Profile::from_hashmap(util::key_equals_val_parse(&plaintext)?)
    }

    pub fn role_of(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.decrypt_profile(ciphertext).map(|profile| profile.role)
    }
}

impl Default for ProfileOracle {
    fn default() -> Self {
        Self::new()
    }
}

// Assumes role= is the last field, as profile_for lays it out
#[instrument(skip_all)]
pub fn attack_ecb_cut_and_paste(encode_and_encrypt: &dyn Oracle) -> Result<Vec<u8>> {
    let block_size = determine_block_size(encode_and_encrypt)?;

    // Fill out the block "email=" starts, so what follows is block-aligned
    let left_padding_len = block_size - b"email=".len() % block_size;

    // '&' and '=' are swallowed, but a block reading "admin<padding>" is not.
    // Submitting it twice makes its ciphertext the repeated block.
    let plaintext = pad_pkcs_7(b"admin", block_size);
    let payload = [
        vec![b'A'; left_padding_len],
        plaintext.clone(),
        plaintext,
    ].concat();
    let encrypted_payload = encode_and_encrypt(&payload)?;
    let (_, admin_block) = repeating_block(&encrypted_payload, block_size)
        .context(NotEcbSnafu)?;

    // Now choose an email that leaves "...&role=" ending on a block boundary,
    // so the final block is all padding and can be swapped out
    let desired_user_prefix = b"evil@evil.com";
    let total_control_len = b"email=&uid=10&role=".len() + desired_user_prefix.len();
    let filler_len = round_up_to_nearest_multiple(total_control_len, block_size) - total_control_len;
    let payload_2 = [
        desired_user_prefix.as_slice(),
        vec![b'A'; filler_len].as_slice(),
    ].concat();
    debug!(block_size, filler_len, "built aligned profile");

    let encrypted_payload_2 = encode_and_encrypt(&payload_2)?;
    Ok([
        &encrypted_payload_2[..encrypted_payload_2.len() - admin_block.len()],
        admin_block.as_slice(),
    ].concat())
}

#[test]
fn test_attack_ecb_cut_and_paste() {
    crate::util::init_tracing();

    let oracle = ProfileOracle::new();
    let honest = oracle.encrypt_profile_for(b"evil@evil.com&role=admin").unwrap();
    assert_eq!(b"user".to_vec(), oracle.role_of(&honest).unwrap());

    let encode_and_encrypt = |email: &[u8]| oracle.encrypt_profile_for(email);
    let encrypted_malicious_profile = attack_ecb_cut_and_paste(&encode_and_encrypt).unwrap();
    assert_eq!(b"admin".to_vec(), oracle.role_of(&encrypted_malicious_profile).unwrap());
}
