//! Our error types for the SDP power supplies.

use thiserror::Error;

use crate::types::Parameter;

pub type Result<T, I> = core::result::Result<T, Error<I>>;

/// Errors raised while encoding commands or decoding responses.
///
/// These never involve the serial channel, so they are usable on their own by anyone driving the
/// codec by hand.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Device address {0} is out of range 1-31")]
    AddressOutOfRange(i32),
    #[error("Parameter out of range: {parameter}")]
    ParameterOutOfRange { parameter: Parameter },
    #[error("Value in response is not a number")]
    NotANumber,
    #[error("Invalid response received")]
    InvalidResponse,
    #[error("Unrecognized LCD segment pattern {pattern:#04x}")]
    DecodeFailure { pattern: u8 },
}

/// Custom error type for SDP power supply communications.
#[derive(Error, Debug)]
pub enum Error<I: embedded_io::Error> {
    #[error("Serial communication error")]
    SerialError(I),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("Device did not respond in time")]
    Timeout,
    #[error("Short write, device accepted {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
}
