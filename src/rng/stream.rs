use rand::RngCore;
use tracing::{debug, instrument};

use crate::rng::Mt19937;

pub const TOKEN_SIZE: usize = 16;

// The keystream is the generator's byte stream, so encrypting and decrypting
// are the same call
pub fn mt19937_stream(buf: &[u8], key: u16) -> Vec<u8> {
    let mut rng = Mt19937::new(u32::from(key));
    let mut keystream = vec![0u8; buf.len()];
    rng.fill_bytes(&mut keystream);
    buf.iter()
        .zip(keystream.iter())
        .map(|(b, k)| b ^ k)
        .collect()
}

/// Brute-forces the 16-bit key of an MT19937 stream ciphertext whose
/// plaintext is known to end in `known_suffix`.
#[instrument(skip_all)]
pub fn recover_stream_key(ciphertext: &[u8], known_suffix: &[u8]) -> Option<u16> {
    if known_suffix.len() > ciphertext.len() {
        return None;
    }
    let key = (0..=u16::MAX).find(|&key| mt19937_stream(ciphertext, key).ends_with(known_suffix));
    debug!(?key, "stream key search finished");
    key
}

pub fn password_reset_token(seed: u32) -> [u8; TOKEN_SIZE] {
    let mut token = [0u8; TOKEN_SIZE];
    Mt19937::new(seed).fill_bytes(&mut token);
    token
}

/// True if some timestamp in the `window` seconds up to `now` seeds a
/// generator that produces exactly this token.
pub fn is_time_seeded_token(token: &[u8], now: u32, window: u32) -> bool {
    (0..=window)
        .map(|delta| now.wrapping_sub(delta))
        .any(|seed| password_reset_token(seed).as_slice() == token)
}

#[test]
fn test_mt19937_stream_round_trip() {
    let plaintext = b"some plaintext that is not a multiple of four";
    let ciphertext = mt19937_stream(plaintext, 0xbeef);
    assert_ne!(plaintext.to_vec(), ciphertext);
    assert_eq!(plaintext.to_vec(), mt19937_stream(&ciphertext, 0xbeef));
    assert_ne!(plaintext.to_vec(), mt19937_stream(&ciphertext, 0xbeee));
}

#[test]
fn test_recover_stream_key() {
    use rand::Rng;
    use crate::crypto::common::random_bytes;

    crate::util::init_tracing();

    let mut rng = rand::thread_rng();
    let key: u16 = rng.gen();
    let known = [b'A'; 14];
    let plaintext = [random_bytes(rng.gen_range(5..=20)), known.to_vec()].concat();
    let ciphertext = mt19937_stream(&plaintext, key);

    let recovered = recover_stream_key(&ciphertext, &known).unwrap();
    assert_eq!(plaintext, mt19937_stream(&ciphertext, recovered));
    assert_eq!(None, recover_stream_key(b"short", &known));
}

#[test]
fn test_password_reset_token() {
    use rand::Rng;

    let now: u32 = 1_700_000_000;
    let issued = password_reset_token(now - 30);
    assert!(is_time_seeded_token(&issued, now, 60));
    assert!(!is_time_seeded_token(&issued, now, 10));

    let random: [u8; TOKEN_SIZE] = rand::thread_rng().gen();
    assert!(!is_time_seeded_token(&random, now, 60));
}
