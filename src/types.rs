//! This module contains the value types exchanged with the SDP power supplies.

use fugit::SecsDurationU32;
use strum_macros::{Display, EnumIter};

use crate::error::ProtocolError;

/// Lowest valid RS485 device address.
pub const ADDRESS_MIN: u8 = 1;
/// Highest valid RS485 device address.
pub const ADDRESS_MAX: u8 = 31;

/// Lowest preset memory number.
pub const PRESET_MIN: u8 = 1;
/// Highest preset memory number.
pub const PRESET_MAX: u8 = 9;
/// Number of presets returned when all of them are requested.
pub const PRESET_COUNT: usize = PRESET_MAX as usize;

/// Lowest timed program item number.
pub const PROGRAM_MIN: u8 = 0;
/// Highest timed program item number.
pub const PROGRAM_MAX: u8 = 19;
/// Number of program items returned when all of them are requested.
pub const PROGRAM_COUNT: usize = PROGRAM_MAX as usize + 1;

/// Longest program item duration, 99 minutes 59 seconds.
pub const DURATION_MAX_SECS: u32 = 99 * 60 + 59;

/// Highest finite number of program repeats.
pub const REPEAT_MAX: u16 = 9999;

/// RS485 address of a power supply.
///
/// Devices connected over RS232 ignore the address, but every command still carries one, so any
/// valid value works there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u8);

impl Address {
    /// Validate and wrap a device address.
    pub fn new(address: i32) -> Result<Self, ProtocolError> {
        if (ADDRESS_MIN as i32..=ADDRESS_MAX as i32).contains(&address) {
            Ok(Self(address as u8))
        } else {
            Err(ProtocolError::AddressOutOfRange(address))
        }
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

/// Factory default address.
impl Default for Address {
    fn default() -> Self {
        Self(ADDRESS_MIN)
    }
}

impl TryFrom<i32> for Address {
    type Error = ProtocolError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<u8> for Address {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value as i32)
    }
}

impl core::fmt::Display for Address {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies which command parameter failed its range check.
#[derive(Debug, Display, EnumIter, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    #[strum(to_string = "voltage (0.0 - 99.9 V)")]
    Voltage,
    #[strum(to_string = "current (0.00 - 9.99 A)")]
    Current,
    #[strum(to_string = "preset number (1 - 9)")]
    PresetNumber,
    #[strum(to_string = "program number (0 - 19)")]
    ProgramNumber,
    #[strum(to_string = "program duration (0 - 99:59)")]
    Duration,
    #[strum(to_string = "repeat count (1 - 9999 or infinite)")]
    RepeatCount,
}

/// Represents the two possible power supply control modes.
#[derive(Debug, EnumIter, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OperatingMode {
    /// Constant voltage regulation mode.
    Cv = 0,
    /// Constant current regulation mode.
    Cc = 1,
}

impl TryFrom<u16> for OperatingMode {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Cv),
            1 => Ok(Self::Cc),
            _ => Err(ProtocolError::InvalidResponse),
        }
    }
}

/// Communication interface the device should listen on.
#[derive(Debug, EnumIter, Clone, Copy, PartialEq, Eq)]
pub enum Interface {
    Rs232,
    Rs485,
}

/// Whether the output, remote mode or a power-on setting is enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum State {
    /// Disabled.
    #[default]
    Off,
    /// Enabled.
    On,
}

impl From<State> for bool {
    fn from(value: State) -> Self {
        match value {
            State::Off => false,
            State::On => true,
        }
    }
}

impl From<bool> for State {
    fn from(value: bool) -> Self {
        match value {
            true => State::On,
            false => State::Off,
        }
    }
}

/// A voltage/current pair. Used for setpoints, maximums and preset memories.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VoltAmp {
    /// Volts.
    pub voltage: f64,
    /// Amps.
    pub current: f64,
}

impl VoltAmp {
    pub const fn new(voltage: f64, current: f64) -> Self {
        Self { voltage, current }
    }
}

/// Measured output values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VaData {
    /// Volts, resolution 10 mV.
    pub voltage: f64,
    /// Amps, resolution 1 mA.
    pub current: f64,
    pub mode: OperatingMode,
}

/// One step of the timed program.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgramItem {
    /// Volts.
    pub voltage: f64,
    /// Amps.
    pub current: f64,
    /// How long this step is held, up to 99:59.
    pub duration: SecsDurationU32,
}

impl ProgramItem {
    pub const fn new(voltage: f64, current: f64, duration: SecsDurationU32) -> Self {
        Self {
            voltage,
            current,
            duration,
        }
    }
}

/// Request a single preset or program item, or all of them at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    One(u8),
    All,
}

/// How many times the timed program should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatCount {
    /// Repeat until stopped. Sent as `0000`.
    Infinite,
    /// Run 1 - 9999 times.
    Times(u16),
}
