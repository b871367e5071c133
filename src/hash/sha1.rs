use crate::hash::{md_padding, BlockBuffer, MerkleDamgard};

const INITIAL_STATE: [u32; 5] = [0x67452301, 0xefcdab89, 0x98badcfe, 0x10325476, 0xc3d2e1f0];

#[derive(Clone)]
pub struct Sha1 {
    state: [u32; 5],
    buffer: BlockBuffer,
}

fn compress(state: &mut [u32; 5], block: &[u8]) {
    let mut w = [0u32; 80];
    for (word, bytes) in w.iter_mut().zip(block.chunks_exact(4)) {
        *word = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    }
    for t in 16..80 {
        w[t] = (w[t-3] ^ w[t-8] ^ w[t-14] ^ w[t-16]).rotate_left(1);
    }

    let [mut a, mut b, mut c, mut d, mut e] = *state;
    for (t, &wt) in w.iter().enumerate() {
        let (f, k) = match t {
            0..=19  => ((b & c) | (!b & d),          0x5a827999),
            20..=39 => (b ^ c ^ d,                   0x6ed9eba1),
            40..=59 => ((b & c) | (b & d) | (c & d), 0x8f1bbcdc),
            _       => (b ^ c ^ d,                   0xca62c1d6),
        };
        let temp = a.rotate_left(5)
            .wrapping_add(f)
            .wrapping_add(e)
            .wrapping_add(k)
            .wrapping_add(wt);
        e = d;
        d = c;
        c = b.rotate_left(30);
        b = a;
        a = temp;
    }

    for (s, v) in state.iter_mut().zip([a, b, c, d, e]) {
        *s = s.wrapping_add(v);
    }
}

impl MerkleDamgard for Sha1 {
    type Digest = [u8; 20];

    fn new() -> Self {
        Self { state: INITIAL_STATE, buffer: BlockBuffer::default() }
    }

    fn from_digest(digest: &Self::Digest, processed_len: u64) -> Self {
        let mut state = [0u32; 5];
        for (s, bytes) in state.iter_mut().zip(digest.chunks_exact(4)) {
            *s = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
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
        let mut digest = [0u8; 20];
        for (out, s) in digest.chunks_exact_mut(4).zip(self.state) {
            out.copy_from_slice(&s.to_be_bytes());
        }
        digest
    }

    fn padding(message_len: u64) -> Vec<u8> {
        md_padding(message_len, true)
    }
}

#[test]
fn test_sha1_vectors() {
    assert_eq!(hex!("a9993e364706816aba3e25717850c26c9cd0d89d"), Sha1::digest(b"abc"));
    assert_eq!(hex!("da39a3ee5e6b4b0d3255bfef95601890afd80709"), Sha1::digest(b""));
    assert_eq!(
        "2fd4e1c67a2d28fced849ee1bb76e7391b93eb12",
        hex::encode(Sha1::digest(b"The quick brown fox jumps over the lazy dog"))
    );
    assert_eq!(
        "84983e441c3bd26ebaae4aa1f95129e5e54670f1",
        hex::encode(Sha1::digest(b"abcdbcdecdefdefgefghfghighijhijkijkljklmklmnlmnomnopnopq"))
    );
}

#[test]
fn test_sha1_incremental() {
    let data: Vec<u8> = (0..1000u32).map(|x| (x * 7) as u8).collect();
    let expected = Sha1::digest(&data);
    for split in [0usize, 1, 63, 64, 65, 500, 999] {
        let mut hasher = Sha1::new();
        hasher.update(&data[..split]);
        hasher.update(&data[split..]);
        assert_eq!(expected, hasher.finalize());
    }
}

#[test]
fn test_sha1_resume_from_digest() {
    // Resuming at a block boundary matches hashing straight through
    let message = b"exactly what was hashed before";
    let glue = Sha1::padding(message.len() as u64);
    let resumed_len = (message.len() + glue.len()) as u64;
    let mut resumed = Sha1::from_digest(&Sha1::digest(message), resumed_len);
    resumed.update(b"and more");
    assert_eq!(Sha1::digest(&[message.as_slice(), glue.as_slice(), b"and more".as_slice()].concat()), resumed.finalize());
}
