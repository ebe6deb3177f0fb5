//! Entropy source and the unbiased generators built on it.
//!
//! Reset codes and provisioning passwords are drawn character by character from a fixed
//! alphabet. Each character consumes random bytes until one falls below the largest multiple of
//! the alphabet size that fits in a byte, so every symbol is equally likely.

use rand::prelude::RngExt;
use rand::rng;

/// Digits used for reset codes.
pub const CODE_ALPHABET: &[u8] = b"0123456789";

/// Length of a reset code.
pub const CODE_LENGTH: usize = 6;

/// Characters used for generated passwords. Excludes `I`, `O`, `i`, `l`, `o`, `0` and `1`.
pub const PASSWORD_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghjkmnpqrstuvwxyz23456789";

/// A cryptographically secure byte source.
pub trait RandomSource: Send + Sync {
    fn fill_bytes(&self, dest: &mut [u8]);
}

/// Thread-local CSPRNG from `rand`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRandom;

impl RandomSource for SystemRandom {
    fn fill_bytes(&self, dest: &mut [u8]) {
        rng().fill(dest);
    }
}

/// Draw `len` symbols uniformly from `alphabet` using rejection sampling.
pub fn sample_uniform(random: &dyn RandomSource, alphabet: &[u8], len: usize) -> String {
    debug_assert!(!alphabet.is_empty() && alphabet.len() <= 256);
    let n = alphabet.len();
    let limit = 256 - (256 % n);

    let mut out = String::with_capacity(len);
    let mut buf = [0u8; 32];
    while out.len() < len {
        random.fill_bytes(&mut buf);
        for &b in &buf {
            if (b as usize) < limit {
                out.push(alphabet[b as usize % n] as char);
                if out.len() == len {
                    break;
                }
            }
        }
    }
    out
}

/// Six ASCII digits.
pub fn generate_code(random: &dyn RandomSource) -> String {
    sample_uniform(random, CODE_ALPHABET, CODE_LENGTH)
}

/// Password for a provisioned account.
pub fn generate_password(random: &dyn RandomSource, len: usize) -> String {
    sample_uniform(random, PASSWORD_ALPHABET, len)
}
