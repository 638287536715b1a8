//! Fixed-width decimal fields, the only number format on the wire.

use crate::error::ProtocolError;

/// Widest digit field used by any command or response.
pub const MAX_WIDTH: usize = 4;

const POWERS_OF_TEN: [u32; MAX_WIDTH + 1] = [1, 10, 100, 1000, 10000];

/// Write `value` as exactly `out.len()` zero padded ASCII digits.
///
/// The caller must have range checked `value` already, `value < 10^out.len()`.
pub fn print_digits(out: &mut [u8], value: u16) {
    debug_assert!((1..=MAX_WIDTH).contains(&out.len()));
    debug_assert!((value as u32) < POWERS_OF_TEN[out.len()]);

    let mut rest = value;
    for digit in out.iter_mut().rev() {
        *digit = b'0' + (rest % 10) as u8;
        rest /= 10;
    }
}

/// Parse every byte of `digits` as one decimal digit.
pub fn parse_digits(digits: &[u8]) -> Result<u16, ProtocolError> {
    debug_assert!((1..=MAX_WIDTH).contains(&digits.len()));

    digits.iter().try_fold(0u16, |acc, &byte| {
        if byte.is_ascii_digit() {
            Ok(acc * 10 + (byte - b'0') as u16)
        } else {
            Err(ProtocolError::NotANumber)
        }
    })
}
