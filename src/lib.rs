//! This crate provides an interface for communicating with and controlling the Manson SDP series
//! of programmable power supplies (SDP-2210, SDP-2405, SDP-2603 and relatives).
//!
//! The SDP protocol is plain ASCII: every command is a four letter mnemonic, the two digit device
//! address and fixed width decimal parameters, terminated by `\r`. Every response ends with
//! `OK\r`, optionally preceded by `\r` terminated data records.
//!
//! The codec ([command], [response], [lcd]) works in `no_std` environments, disable the default
//! `std` feature for that. The blocking session [psu::SdpPsu] needs `std` for its deadlines.
//!
//! The serial port used for PSU comms should be configured like so:
//! * Baud rate: 9600
//! * Data bits: 8
//! * Stop bits: 1
//! * Parity: None
//!
//! RS232 devices ignore the address, RS485 devices answer to theirs (1 - 31).

#![cfg_attr(not(feature = "std"), no_std)]

pub mod channel;
pub mod command;
pub mod config;
pub mod digits;
pub mod error;
pub mod lcd;
#[cfg(feature = "std")]
pub mod psu;
pub mod response;
pub mod scaling;
pub mod types;

#[cfg(test)]
mod mock_serial;
