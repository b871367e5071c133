use crate::hash::{md_padding, BlockBuffer, MerkleDamgard};

const INITIAL_STATE: [u32; 4] = [0x67452301, 0xefcdab89, 0x98badcfe, 0x10325476];

// Word order and rotation amounts for each of the three rounds
const ROUND_2_ORDER: [usize; 16] = [0, 4, 8, 12, 1, 5, 9, 13, 2, 6, 10, 14, 3, 7, 11, 15];
const ROUND_3_ORDER: [usize; 16] = [0, 8, 4, 12, 2, 10, 6, 14, 1, 9, 5, 13, 3, 11, 7, 15];
const ROUND_1_SHIFTS: [u32; 4] = [3, 7, 11, 19];
const ROUND_2_SHIFTS: [u32; 4] = [3, 5, 9, 13];
const ROUND_3_SHIFTS: [u32; 4] = [3, 9, 11, 15];

#[derive(Clone)]
pub struct Md4 {
    state: [u32; 4],
    buffer: BlockBuffer,
}

fn f(x: u32, y: u32, z: u32) -> u32 {
    (x & y) | (!x & z)
}

fn g(x: u32, y: u32, z: u32) -> u32 {
    (x & y) | (x & z) | (y & z)
}

fn h(x: u32, y: u32, z: u32) -> u32 {
    x ^ y ^ z
}

// Step i updates a, d, c, b in turn, reading the other three in rotated order
fn round(
    st: &mut [u32; 4],
    x: &[u32; 16],
    order: impl Fn(usize) -> usize,
    shifts: &[u32; 4],
    mix: fn(u32, u32, u32) -> u32,
    constant: u32,
) {
    for i in 0..16 {
        let (ia, ib, ic, id) = match i % 4 {
            0 => (0, 1, 2, 3),
            1 => (3, 0, 1, 2),
            2 => (2, 3, 0, 1),
            _ => (1, 2, 3, 0),
        };
        st[ia] = st[ia]
            .wrapping_add(mix(st[ib], st[ic], st[id]))
            .wrapping_add(x[order(i)])
            .wrapping_add(constant)
            .rotate_left(shifts[i % 4]);
    }
}

fn compress(state: &mut [u32; 4], block: &[u8]) {
    let mut x = [0u32; 16];
    for (word, bytes) in x.iter_mut().zip(block.chunks_exact(4)) {
        *word = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    }

    let mut st = *state;
    round(&mut st, &x, |i| i, &ROUND_1_SHIFTS, f, 0);
    round(&mut st, &x, |i| ROUND_2_ORDER[i], &ROUND_2_SHIFTS, g, 0x5a827999);
    round(&mut st, &x, |i| ROUND_3_ORDER[i], &ROUND_3_SHIFTS, h, 0x6ed9eba1);

    for (s, v) in state.iter_mut().zip(st) {
        *s = s.wrapping_add(v);
    }
}

impl MerkleDamgard for Md4 {
    type Digest = [u8; 16];

    fn new() -> Self {
        Self { state: INITIAL_STATE, buffer: BlockBuffer::default() }
    }

    fn from_digest(digest: &Self::Digest, processed_len: u64) -> Self {
        let mut state = [0u32; 4];
        for (s, bytes) in state.iter_mut().zip(digest.chunks_exact(4)) {
            *s = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        }
        Self { state, buffer: BlockBuffer::resume(processed_len) }
    }

    fn update(&mut self, data: &[u8]) {
        let state = &mut self.state;
        self.buffer.update(data, |block| compress(state, block));
    }

    fn finalize(mut self) -> Self::Digest {
        let padding = Self::padding(self.buffer.len());
        self.update(&padding);
        let mut digest = [0u8; 16];
        for (out, s) in digest.chunks_exact_mut(4).zip(self.state) {
            out.copy_from_slice(&s.to_le_bytes());
        }
        digest
    }

    fn padding(message_len: u64) -> Vec<u8> {
        md_padding(message_len, false)
    }
}

#[test]
fn test_md4_vectors() {
    // RFC 1320, appendix A.5
    assert_eq!(hex!("31d6cfe0d16ae931b73c59d7e0c089c0"), Md4::digest(b""));
    assert_eq!(hex!("bde52cb31de33e46245e05fbdbd6fb24"), Md4::digest(b"a"));
    assert_eq!(hex!("a448017aaf21d8525fc10ae87aa6729d"), Md4::digest(b"abc"));
    assert_eq!(hex!("d9130a8164549fe818874806e1c7014b"), Md4::digest(b"message digest"));
    assert_eq!(
        "e33b4ddc9c38f2199c3e7b164fcc0536",
        hex::encode(Md4::digest(b"12345678901234567890123456789012345678901234567890123456789012345678901234567890"))
    );
}

#[test]
fn test_md4_incremental() {
    let data: Vec<u8> = (0..300u32).map(|x| (x * 13) as u8).collect();
    let expected = Md4::digest(&data);
    for split in [0usize, 1, 55, 56, 64, 128, 299] {
        let mut hasher = Md4::new();
        hasher.update(&data[..split]);
        hasher.update(&data[split..]);
        assert_eq!(expected, hasher.finalize());
    }
}
