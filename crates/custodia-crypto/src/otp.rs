//! Fixed-length numeric OTPs (spec §6): 4–10 digits, default 6.

use rand::Rng;
use subtle::ConstantTimeEq;

use custodia_core::constants::{DEFAULT_OTP_LENGTH, MAX_OTP_LENGTH, MIN_OTP_LENGTH};

/// Generate a fixed-length decimal OTP. `len` is clamped to [4, 10].
pub fn generate_otp(len: u8) -> String {
    let len = len.clamp(MIN_OTP_LENGTH, MAX_OTP_LENGTH) as usize;
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from_digit(rng.gen_range(0..10), 10).unwrap())
        .collect()
}

pub fn generate_default_otp() -> String {
    generate_otp(DEFAULT_OTP_LENGTH)
}

/// Constant-time comparison of a submitted code against the expected one.
pub fn verify_otp(submitted: &str, expected: &str) -> bool {
    submitted.as_bytes().ct_eq(expected.as_bytes()).unwrap_u8() == 1
}
