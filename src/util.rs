use std::collections::HashMap;

use snafu::prelude::*;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("buffers differ in length ({left} vs {right})"))]
    LengthMismatch { left: usize, right: usize },

    #[snafu(display("length {len} is not a multiple of the block size {block_size}"))]
    NotBlockAligned { len: usize, block_size: usize },

    #[snafu(display("block cipher expects {expected}-byte blocks, got {len}"))]
    BlockWidth { expected: usize, len: usize },

    #[snafu(display("key must be {expected} bytes, got {len}"))]
    InvalidKeyLength { expected: usize, len: usize },

    #[snafu(display("invalid PKCS#7 padding"))]
    InvalidPadding {},

    #[snafu(display("block cipher failure: {source}"))]
    Cipher { source: openssl::error::ErrorStack },

    #[snafu(display("malformed base64: {source}"))]
    Base64 { source: base64::DecodeError },

    #[snafu(display("oracle output shows no repeated blocks, refusing to treat it as ECB"))]
    NotEcb {},

    #[snafu(display("no byte value satisfied the oracle at offset {offset}"))]
    SearchExhausted { offset: usize },

    #[snafu(display("could not parse key=value encoding"))]
    Parse {},

    #[snafu(display("plaintext contains high-ASCII bytes: {plaintext:?}"))]
    NonAscii { plaintext: Vec<u8> },

    #[snafu(display("offset {offset} lies outside a {len}-byte buffer"))]
    OffsetOutOfRange { offset: usize, len: usize },

    #[snafu(display("no key length up to {max_key_len} produced an accepted forgery"))]
    ForgeryFailed { max_key_len: usize },

    #[snafu(display("oracle never leaked a decrypted plaintext"))]
    KeyRecoveryFailed {},
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// Parses `k1=v1&k2=v2`. A pair without exactly one `=` is rejected, and
// later duplicates overwrite earlier ones.
pub fn key_equals_val_parse(buf: &[u8]) -> Result<HashMap<Vec<u8>, Vec<u8>>> {
    buf.split(|&b| b == b'&')
        .map(|pair| {
            let mut parts = pair.split(|&b| b == b'=');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(k), Some(v), None) if !k.is_empty() => Ok((k.to_vec(), v.to_vec())),
                _ => ParseSnafu.fail(),
            }
        })
        .collect()
}

#[test]
fn test_key_equals_val_parse() {
    let parsed = key_equals_val_parse(b"foo=bar&baz=qux&zap=zazzle").unwrap();
    assert_eq!(3, parsed.len());
    assert_eq!(b"bar".as_slice(), parsed[b"foo".as_slice()]);
    assert_eq!(b"zazzle".as_slice(), parsed[b"zap".as_slice()]);

    assert!(matches!(key_equals_val_parse(b"foo=bar&baz"), Err(Error::Parse {})));
    assert!(matches!(key_equals_val_parse(b"foo=b=ar"), Err(Error::Parse {})));
}

#[cfg(test)]
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
