use std::num::Wrapping;
use rand::{RngCore, SeedableRng};
use snafu::ensure;
use tracing::debug;

use crate::util::{LengthMismatchSnafu, Result};

pub mod stream;

// MT19937 parameters, named as in the reference description
const N: usize = 624;
const M: usize = 397;
const A: u32 = 0x9908b0df;
const U: u32 = 11;
const D: u32 = 0xffffffff;
const S: u32 = 7;
const B: u32 = 0x9d2c5680;
const T: u32 = 15;
const C: u32 = 0xefc60000;
const L: u32 = 18;
const F: u32 = 1812433253;

const UPPER_MASK: u32 = 0x80000000;
const LOWER_MASK: u32 = 0x7fffffff;

/// Number of consecutive outputs needed to rebuild the whole state.
pub const STATE_SIZE: usize = N;

#[derive(Clone)]
pub struct Mt19937 {
    mt: [u32; N],
    idx: usize,
}

impl Mt19937 {
    pub fn new(seed: u32) -> Self {
        let mut mt = [0u32; N];
        mt[0] = seed;
        for i in 1..N {
            let prev = mt[i-1];
            mt[i] = (Wrapping(F) * Wrapping(prev ^ (prev >> 30)) + Wrapping(i as u32)).0;
        }
        Self::from_state(mt)
    }

    /// Starts from a raw, untempered state. The first output comes after a
    /// twist, exactly as for a freshly seeded generator.
    pub fn from_state(mt: [u32; N]) -> Self {
        Self { mt, idx: N }
    }

    /// Rebuilds a generator from 624 consecutive outputs taken right after a
    /// twist. The clone then predicts everything that follows.
    pub fn clone_from_outputs(outputs: &[u32]) -> Result<Self> {
        ensure!(outputs.len() == N, LengthMismatchSnafu { left: outputs.len(), right: N });
        let mut mt = [0u32; N];
        for (slot, &output) in mt.iter_mut().zip(outputs) {
            *slot = untemper(output);
        }
        Ok(Self::from_state(mt))
    }

    pub fn next_u32(&mut self) -> u32 {
        if self.idx >= N {
            self.twist();
        }
        let y = self.mt[self.idx];
        self.idx += 1;
        temper(y)
    }

    fn twist(&mut self) {
        for i in 0..N {
            let x = (self.mt[i] & UPPER_MASK) | (self.mt[(i+1) % N] & LOWER_MASK);
            let mut x_a = x >> 1;
            if x % 2 != 0 {
                x_a ^= A;
            }
            self.mt[i] = self.mt[(i+M) % N] ^ x_a;
        }
        self.idx = 0;
    }
}

impl RngCore for Mt19937 {
    fn next_u32(&mut self) -> u32 {
        Mt19937::next_u32(self)
    }

    fn next_u64(&mut self) -> u64 {
        let low = u64::from(Mt19937::next_u32(self));
        let high = u64::from(Mt19937::next_u32(self));
        (high << 32) | low
    }

    // Little-endian bytes of successive outputs; a trailing partial word is truncated
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = Mt19937::next_u32(self).to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl SeedableRng for Mt19937 {
    type Seed = [u8; 4];

    fn from_seed(seed: Self::Seed) -> Self {
        Self::new(u32::from_le_bytes(seed))
    }
}

pub fn temper(mut y: u32) -> u32 {
    y ^= (y >> U) & D;
    y ^= (y << S) & B;
    y ^= (y << T) & C;
    y ^= y >> L;
    y
}

// Each pass recovers another `shift` bits, starting from the ones the
// shift left untouched
fn undo_right_shift_xor(y: u32, shift: u32, mask: u32) -> u32 {
    let mut x = y;
    for _ in 0..32 / shift {
        x = y ^ ((x >> shift) & mask);
    }
    x
}

fn undo_left_shift_xor(y: u32, shift: u32, mask: u32) -> u32 {
    let mut x = y;
    for _ in 0..32 / shift {
        x = y ^ ((x << shift) & mask);
    }
    x
}

pub fn untemper(y: u32) -> u32 {
    let y = undo_right_shift_xor(y, L, 0xffffffff);
    let y = undo_left_shift_xor(y, T, C);
    let y = undo_left_shift_xor(y, S, B);
    undo_right_shift_xor(y, U, D)
}

/// Finds the seed of a generator seeded with a timestamp from the last
/// `window` seconds before `now`, given its first output.
pub fn crack_time_seed(first_output: u32, now: u32, window: u32) -> Option<u32> {
    let seed = (0..=window)
        .map(|delta| now.wrapping_sub(delta))
        .find(|&seed| Mt19937::new(seed).next_u32() == first_output);
    debug!(?seed, now, window, "time seed search finished");
    seed
}

#[test]
fn test_mt19937_reference_output() {
    // Reference sequence for the default seed
    let mut rng = Mt19937::new(5489);
    let expected = [3499211612u32, 581869302, 3890346734, 3586334585, 545404204];
    for e in expected {
        assert_eq!(e, rng.next_u32());
    }
    // The 10000th output, as required of std::mt19937
    let mut rng = Mt19937::new(5489);
    let tenth_thousand = (0..10000).map(|_| rng.next_u32()).last();
    assert_eq!(Some(4123659995), tenth_thousand);
}

#[test]
fn test_untemper() {
    use rand::Rng;

    let mut rng = rand::thread_rng();
    for _ in 0..1000 {
        let x: u32 = rng.gen();
        assert_eq!(x, untemper(temper(x)));
        assert_eq!(x, temper(untemper(x)));
    }
    assert_eq!(0, untemper(0));
    assert_eq!(u32::MAX, untemper(temper(u32::MAX)));
}

#[test]
fn test_clone_from_outputs() {
    use rand::Rng;

    let mut original = Mt19937::new(rand::thread_rng().gen());
    let outputs: Vec<u32> = (0..STATE_SIZE).map(|_| original.next_u32()).collect();
    let mut clone = Mt19937::clone_from_outputs(&outputs).unwrap();
    for _ in 0..2000 {
        assert_eq!(original.next_u32(), clone.next_u32());
    }
}

#[test]
fn test_clone_from_outputs_wrong_length() {
    use crate::util::Error;

    let result = Mt19937::clone_from_outputs(&[0u32; 623]);
    assert!(matches!(result, Err(Error::LengthMismatch { left: 623, right: 624 })));
}

#[test]
fn test_rng_core() {
    let mut words = Mt19937::new(42);
    let mut bytes = Mt19937::new(42);
    let mut buf = [0u8; 10];
    RngCore::fill_bytes(&mut bytes, &mut buf);
    assert_eq!(words.next_u32().to_le_bytes(), buf[0..4]);
    assert_eq!(words.next_u32().to_le_bytes(), buf[4..8]);
    assert_eq!(words.next_u32().to_le_bytes()[..2], buf[8..10]);

    let mut seeded = Mt19937::from_seed(42u32.to_le_bytes());
    assert_eq!(Mt19937::new(42).next_u32(), RngCore::next_u32(&mut seeded));
}

#[test]
fn test_crack_time_seed() {
    use rand::Rng;

    crate::util::init_tracing();

    let mut rng = rand::thread_rng();
    let now: u32 = 1_700_000_000;
    let seed = now - rng.gen_range(40..1000);
    let first_output = Mt19937::new(seed).next_u32();
    assert_eq!(Some(seed), crack_time_seed(first_output, now, 2000));
    assert_eq!(None, crack_time_seed(first_output, seed - 1, 100));
}
