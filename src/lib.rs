#[macro_use] extern crate hex_literal;

mod util;
pub mod crypto;
pub mod hash;
pub mod rng;

pub use util::*;
pub use crypto::*;
