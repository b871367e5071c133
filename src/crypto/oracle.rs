use rand::Rng;
use snafu::ensure;

use crate::crypto::aes::Aes128;
use crate::crypto::aes::cbc::cbc_encrypt;
use crate::crypto::aes::ecb::ecb_encrypt;
use crate::crypto::common::{generate_random_bytes, pad_pkcs_7, random_bytes};
use crate::util::{OffsetOutOfRangeSnafu, Result};

/// An encryption oracle: attacker bytes in, ciphertext out. Whatever keys
/// it uses are captured by the closure and unreachable from outside.
pub trait Oracle: Fn(&[u8]) -> Result<Vec<u8>> {}
impl<T: Fn(&[u8]) -> Result<Vec<u8>>> Oracle for T {}

pub fn get_id_oracle() -> Box<dyn Oracle> {
    Box::new(move |buf: &[u8]| {
        Ok(buf.to_vec())
    })
}

pub fn choose_random<'a>(f: impl Oracle + 'a, g: impl Oracle + 'a) -> (bool, impl Oracle + 'a) {
    let mut rng = rand::thread_rng();
    let choose_f: bool = rng.gen();
    (choose_f, move |buf: &[u8]| {
        match choose_f {
            true  => f(buf),
            false => g(buf),
        }
    })
}

// The victim for mode detection: random bytes either side of the input,
// then ECB or CBC under a fresh key, decided by a coin flip.
pub fn random_mode_oracle() -> (bool, Box<dyn Oracle>) {
    let ecb_oracle = get_id_oracle()
        .pullback_add_random_left_padding::<5,10>()
        .pullback_add_random_right_padding::<5,10>()
        .pushforward_pkcs_7(16)
        .pushforward_ecb_encrypt_fixed_key();
    let cbc_oracle = get_id_oracle()
        .pullback_add_random_left_padding::<5,10>()
        .pullback_add_random_right_padding::<5,10>()
        .pushforward_pkcs_7(16)
        .pushforward_cbc_encrypt_fixed_key();
    let (is_ecb, oracle) = choose_random(ecb_oracle, cbc_oracle);
    (is_ecb, Box::new(oracle))
}

impl dyn Oracle {
    pub fn pullback_add_left_padding(self: Box<dyn Oracle>, lpad: &[u8]) -> Box<dyn Oracle> {
        let owned_lpad = lpad.to_owned();
        Box::new(move |buf: &[u8]| {
            let joined = [
                owned_lpad.as_slice(),
                buf,
            ].concat();
            self(&joined)
        })
    }

    pub fn pullback_add_right_padding(self: Box<dyn Oracle>, rpad: &[u8]) -> Box<dyn Oracle> {
        let owned_rpad = rpad.to_owned();
        Box::new(move |buf: &[u8]| {
            let joined = [
                buf,
                owned_rpad.as_slice(),
            ].concat();
            self(&joined)
        })
    }

    pub fn pullback_add_random_left_padding<const MIN: usize, const MAX: usize>(self: Box<dyn Oracle>) -> Box<dyn Oracle> {
        let pad_len: usize = rand::thread_rng().gen_range(MIN..=MAX);
        self.pullback_add_left_padding(&random_bytes(pad_len))
    }

    pub fn pullback_add_random_right_padding<const MIN: usize, const MAX: usize>(self: Box<dyn Oracle>) -> Box<dyn Oracle> {
        let pad_len: usize = rand::thread_rng().gen_range(MIN..=MAX);
        self.pullback_add_right_padding(&random_bytes(pad_len))
    }

    pub fn pushforward_ecb_encrypt_fixed_key(self: Box<dyn Oracle>) -> Box<dyn Oracle> {
        let cipher = Aes128::from(generate_random_bytes());
        Box::new(move |buf: &[u8]| {
            let plaintext = self(buf)?;
            ecb_encrypt(&cipher, &plaintext)
        })
    }

    pub fn pushforward_cbc_encrypt_fixed_key(self: Box<dyn Oracle>) -> Box<dyn Oracle> {
        let cipher = Aes128::from(generate_random_bytes());
        let iv: [u8; 16] = generate_random_bytes();
        Box::new(move |buf: &[u8]| {
            let plaintext = self(buf)?;
            cbc_encrypt(&cipher, &plaintext, &iv)
        })
    }

    pub fn pushforward_pkcs_7(self: Box<dyn Oracle>, block_size: usize) -> Box<dyn Oracle> {
        Box::new(move |buf: &[u8]| {
            let out = self(buf)?;
            Ok(pad_pkcs_7(&out, block_size))
        })
    }
}

#[test]
fn test_oracle_composition_order() {
    let oracle = get_id_oracle()
        .pullback_add_left_padding(b"<<")
        .pullback_add_right_padding(b">>")
        .pushforward_pkcs_7(4);
    assert_eq!(b"<<ab>>\x02\x02".to_vec(), oracle(b"ab").unwrap());
    assert_eq!(b"<<>>\x04\x04\x04\x04".to_vec(), oracle(b"").unwrap());
}

#[test]
fn test_random_padding_is_fixed_per_oracle() {
    let oracle = get_id_oracle()
        .pullback_add_random_left_padding::<0, 20>()
        .pullback_add_random_right_padding::<3, 3>();
    let first = oracle(b"middle").unwrap();
    assert_eq!(first, oracle(b"middle").unwrap());
    assert!(first.len() >= 9 && first.len() <= 29);
    assert_eq!(b"middle", &first[first.len() - 9..first.len() - 3]);
}

pub const COMMENT_PREFIX: &[u8] = b"comment1=cooking%20MCs;userdata=";
pub const COMMENT_SUFFIX: &[u8] = b";comment2=%20like%20a%20pound%20of%20bacon";
pub const ADMIN_TOKEN: &[u8] = b";admin=true;";
// ADMIN_TOKEN with the low bit of each metacharacter cleared, so it survives
// quoting. Flipping those bits back in the ciphertext restores the token.
pub const ADMIN_PLACEHOLDER: &[u8] = b":admin<true:";

/// The two capabilities a comment-encrypting service exposes: encrypting
/// attacker-chosen userdata inside a fixed template, and deciding whether a
/// ciphertext grants admin.
pub trait CommentOracle {
    fn encrypt_userdata(&self, userdata: &[u8]) -> Result<Vec<u8>>;
    fn is_admin(&self, ciphertext: &[u8]) -> Result<bool>;
}

// Quotes out the metacharacters, so `;` becomes `";"` and `=` becomes `"="`.
// Nothing the attacker submits can decrypt to a raw `;` or `=`.
pub fn quote_userdata(userdata: &[u8]) -> Vec<u8> {
    let specials = userdata.iter().filter(|&&b| b == b';' || b == b'=').count();
    let mut out = Vec::with_capacity(userdata.len() + 2 * specials);
    for &b in userdata {
        if b == b';' || b == b'=' {
            out.extend_from_slice(&[b'"', b, b'"']);
        } else {
            out.push(b);
        }
    }
    out
}

pub fn wrap_userdata(userdata: &[u8]) -> Vec<u8> {
    [COMMENT_PREFIX, quote_userdata(userdata).as_slice(), COMMENT_SUFFIX].concat()
}

pub fn contains_admin(plaintext: &[u8]) -> bool {
    plaintext
        .windows(ADMIN_TOKEN.len())
        .any(|w| w == ADMIN_TOKEN)
}

/// XORs `ADMIN_TOKEN ^ ADMIN_PLACEHOLDER` into `ciphertext` at `offset`.
/// Under CTR that offset is the placeholder itself; under CBC it is the block
/// before it.
pub fn flip_placeholder(ciphertext: &mut [u8], offset: usize) -> Result<()> {
    let len = ciphertext.len();
    ensure!(offset <= len && ADMIN_TOKEN.len() <= len - offset, OffsetOutOfRangeSnafu { offset, len });
    for (c, (&target, &placeholder)) in ciphertext[offset..].iter_mut().zip(ADMIN_TOKEN.iter().zip(ADMIN_PLACEHOLDER)) {
        *c ^= target ^ placeholder;
    }
    Ok(())
}

#[test]
fn test_flip_placeholder() {
    let mut buf = [b"xx".as_slice(), ADMIN_PLACEHOLDER, b"yy".as_slice()].concat();
    flip_placeholder(&mut buf, 2).unwrap();
    assert_eq!([b"xx".as_slice(), ADMIN_TOKEN, b"yy".as_slice()].concat(), buf);
    assert!(flip_placeholder(&mut buf, 5).is_err());
}

#[test]
fn test_wrap_userdata_quotes_metacharacters() {
    let wrapped = wrap_userdata(b";admin=true;");
    assert_eq!(
        b"comment1=cooking%20MCs;userdata=\";\"admin\"=\"true\";\";comment2=%20like%20a%20pound%20of%20bacon".to_vec(),
        wrapped
    );
    assert!(!contains_admin(&wrapped));
    assert!(contains_admin(b"xx;admin=true;xx"));
    assert!(!contains_admin(b";admin=true"));
}

#[test]
fn test_admin_placeholder_is_one_bit_per_metacharacter() {
    assert_eq!(ADMIN_TOKEN.len(), ADMIN_PLACEHOLDER.len());
    assert_eq!(quote_userdata(ADMIN_PLACEHOLDER), ADMIN_PLACEHOLDER.to_vec());
    for (&t, &p) in ADMIN_TOKEN.iter().zip(ADMIN_PLACEHOLDER) {
        assert!(t == p || t ^ p == 0x01);
    }
}
