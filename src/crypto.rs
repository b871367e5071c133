pub mod aes;
pub mod common;
pub mod oracle;
pub mod xor;
