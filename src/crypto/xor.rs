use snafu::ensure;

use crate::util::{LengthMismatchSnafu, Result};

pub fn fixed_xor(buf1: &[u8], buf2: &[u8]) -> Result<Vec<u8>> {
    ensure!(buf1.len() == buf2.len(), LengthMismatchSnafu { left: buf1.len(), right: buf2.len() });
    Ok(buf1.iter()
        .zip(buf2.iter())
        .map(|(x,y)| x ^ y)
        .collect())
}

#[test]
fn test_fixed_xor() {
    let case_buf1 = hex!("1c0111001f010100061a024b53535009181c");
    let case_buf2 = hex!("686974207468652062756c6c277320657965");
    let expected = hex!("746865206b696420646f6e277420706c6179");
    let result = fixed_xor(&case_buf1, &case_buf2).unwrap();
    assert_eq!(result, expected);
}

#[test]
fn test_fixed_xor_length_mismatch() {
    let result = fixed_xor(b"abc", b"ab");
    assert!(matches!(result, Err(crate::util::Error::LengthMismatch { left: 3, right: 2 })));
}

pub fn xor_in_place(buf: &mut [u8], mask: &[u8]) -> Result<()> {
    ensure!(buf.len() == mask.len(), LengthMismatchSnafu { left: buf.len(), right: mask.len() });
    buf.iter_mut()
        .zip(mask.iter())
        .for_each(|(b, m)| *b ^= m);
    Ok(())
}

#[test]
fn test_xor_in_place() {
    let mut buf = *b"YELLOW";
    xor_in_place(&mut buf, &[0x20; 6]).unwrap();
    assert_eq!(b"yellow", &buf);
    assert!(xor_in_place(&mut buf, &[0; 5]).is_err());
    // A failed call leaves the buffer untouched
    assert_eq!(b"yellow", &buf);
}

pub fn byte_xor(buf: &[u8], b: u8) -> Vec<u8> {
    buf.iter()
        .map(|x| x ^ b )
        .collect()
}

#[test]
fn test_byte_xor() {
    assert_eq!(vec![0x11, 0x10, 0x00], byte_xor(&[0x01, 0x00, 0x10], 0x10));
}
