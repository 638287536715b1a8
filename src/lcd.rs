//! Decoding of the `GPAL` LCD dump.
//!
//! The device answers `GPAL` with the state of every segment of its display: 68 data bytes, then
//! `\rOK\r`. Each data byte carries one nibble in its low four bits. Two consecutive nibbles,
//! high first, make up the seven segment pattern of one digit. Single nibbles are indicator
//! flags, lit when the nibble is zero.
//!
//! Byte layout of the data part:
//!
//! | Bytes   | Content                                        |
//! |---------|------------------------------------------------|
//! | 0 - 8   | read voltage, 4 digits + indicator             |
//! | 9 - 17  | read current, 4 digits + indicator             |
//! | 18 - 26 | read power, 4 digits + indicator               |
//! | 27 - 35 | timer `mm:ss`, 4 digits + indicator            |
//! | 36 - 38 | colon, `m` and `s` indicators                  |
//! | 39 - 47 | set voltage, 3 digits + const, bar, indicator  |
//! | 48 - 56 | set current, 3 digits + const, bar, indicator  |
//! | 57 - 58 | program number, 1 digit                        |
//! | 59 - 67 | program on, program bar, setting, key lock, key open, fault, output on, output off, remote |

use fugit::SecsDurationU32;
use modular_bitfield::prelude::*;

use crate::{error::ProtocolError, response::fixed_data, scaling::ScalingFactors};

/// Number of data bytes in the dump, terminators excluded.
pub const LCD_DATA_LEN: usize = 68;

/// Segment patterns of the digits 0 - 9, decimal point off.
pub const SEGMENT_DIGITS: [u8; 10] = [0x3f, 0x06, 0x5b, 0x4f, 0x66, 0x6d, 0x7d, 0x07, 0x7f, 0x6f];

/// One seven segment digit as lit on the display.
///
/// ```text
///  -a-
/// f   b
///  -g-
/// e   c
///  -d-  .dp
/// ```
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentPattern {
    pub a: bool,
    pub b: bool,
    pub c: bool,
    pub d: bool,
    pub e: bool,
    pub f: bool,
    pub g: bool,
    /// Decimal point (or sign) next to the digit. Not used for the digit value.
    pub dp: bool,
}

impl SegmentPattern {
    pub fn from_byte(pattern: u8) -> Self {
        Self::from_bytes([pattern])
    }

    pub fn to_byte(self) -> u8 {
        self.into_bytes()[0]
    }

    /// The digit shown. A dark digit (leading blank) reads as 0.
    pub fn digit(self) -> Result<u8, ProtocolError> {
        let segments = self.with_dp(false).to_byte();
        if segments == 0 {
            return Ok(0);
        }

        SEGMENT_DIGITS
            .iter()
            .position(|&digit| digit == segments)
            .map(|digit| digit as u8)
            .ok_or(ProtocolError::DecodeFailure {
                pattern: self.to_byte(),
            })
    }
}

const READ_VOLTAGE: usize = 0;
const READ_CURRENT: usize = 9;
const READ_POWER: usize = 18;
const TIMER: usize = 27;
const COLON: usize = 36;
const MINUTES: usize = 37;
const SECONDS: usize = 38;
const SET_VOLTAGE: usize = 39;
const SET_CURRENT: usize = 48;
const PROGRAM: usize = 57;
const PROGRAM_ON: usize = 59;
const PROGRAM_BAR: usize = 60;
const SETTING: usize = 61;
const KEY_LOCK: usize = 62;
const KEY_OPEN: usize = 63;
const FAULT: usize = 64;
const OUTPUT_ON: usize = 65;
const OUTPUT_OFF: usize = 66;
const REMOTE: usize = 67;

/// The LCD dump with the transport encoding removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LcdRaw {
    nibbles: [u8; LCD_DATA_LEN],
}

impl LcdRaw {
    /// Check the length of a complete `GPAL` response and extract the nibbles.
    pub fn from_response(buf: &[u8]) -> Result<Self, ProtocolError> {
        let data = fixed_data(buf, LCD_DATA_LEN)?;
        let mut nibbles = [0u8; LCD_DATA_LEN];
        for (nibble, byte) in nibbles.iter_mut().zip(data) {
            *nibble = byte & 0x0f;
        }
        Ok(Self { nibbles })
    }

    pub fn nibbles(&self) -> &[u8; LCD_DATA_LEN] {
        &self.nibbles
    }

    /// The segment pattern stored in the nibble pair at `offset`, decimal point included.
    pub fn segment(&self, offset: usize) -> SegmentPattern {
        SegmentPattern::from_byte((self.nibbles[offset] << 4) | self.nibbles[offset + 1])
    }

    /// Whether the indicator at `offset` is lit.
    pub fn flag(&self, offset: usize) -> bool {
        self.nibbles[offset] == 0
    }

    fn digits<const N: usize>(&self, offset: usize) -> Result<[u8; N], ProtocolError> {
        let mut digits = [0u8; N];
        for (idx, digit) in digits.iter_mut().enumerate() {
            *digit = self.segment(offset + 2 * idx).digit()?;
        }
        Ok(digits)
    }

    fn number<const N: usize>(&self, offset: usize) -> Result<u16, ProtocolError> {
        let digits = self.digits::<N>(offset)?;
        Ok(digits
            .iter()
            .fold(0u16, |acc, &digit| acc * 10 + digit as u16))
    }

    fn timer(&self) -> Result<SecsDurationU32, ProtocolError> {
        let [m1, m0, s1, s0] = self.digits::<4>(TIMER)?;
        let secs = m1 as u32 * 600 + m0 as u32 * 60 + s1 as u32 * 10 + s0 as u32;
        Ok(SecsDurationU32::secs(secs))
    }
}

/// A numeric LCD field with the indicator next to it.
///
/// Every field decodes on its own, one unreadable digit does not spoil the rest of the dump.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LcdField<T> {
    pub value: Result<T, ProtocolError>,
    pub indicator: bool,
}

/// A setpoint shown in the lower half of the display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LcdSetpoint {
    pub value: Result<f64, ProtocolError>,
    /// The `CONST` marker, lit when regulation is on this quantity.
    pub constant: bool,
    pub bar: bool,
    pub indicator: bool,
}

/// Everything visible on the front panel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LcdInfo {
    /// Volts.
    pub read_voltage: LcdField<f64>,
    /// Amps.
    pub read_current: LcdField<f64>,
    /// Watts.
    pub read_power: LcdField<f64>,
    pub timer: LcdField<SecsDurationU32>,
    pub colon: bool,
    pub minutes_indicator: bool,
    pub seconds_indicator: bool,
    /// Volts.
    pub set_voltage: LcdSetpoint,
    /// Amps.
    pub set_current: LcdSetpoint,
    pub program: Result<u8, ProtocolError>,
    pub program_on: bool,
    pub program_bar: bool,
    pub setting: bool,
    pub key_lock: bool,
    pub key_open: bool,
    pub fault: bool,
    pub output_on: bool,
    pub output_off: bool,
    pub remote: bool,
}

impl From<&LcdRaw> for LcdInfo {
    fn from(raw: &LcdRaw) -> Self {
        let reading = ScalingFactors::LCD_READING;
        let setpoint = ScalingFactors::LCD_SETPOINT;

        LcdInfo {
            read_voltage: LcdField {
                value: raw.number::<4>(READ_VOLTAGE).map(|v| reading.raw_to_volts(v)),
                indicator: raw.flag(READ_VOLTAGE + 8),
            },
            read_current: LcdField {
                value: raw.number::<4>(READ_CURRENT).map(|v| reading.raw_to_amps(v)),
                indicator: raw.flag(READ_CURRENT + 8),
            },
            read_power: LcdField {
                value: raw.number::<4>(READ_POWER).map(|v| reading.raw_to_watts(v)),
                indicator: raw.flag(READ_POWER + 8),
            },
            timer: LcdField {
                value: raw.timer(),
                indicator: raw.flag(TIMER + 8),
            },
            colon: raw.flag(COLON),
            minutes_indicator: raw.flag(MINUTES),
            seconds_indicator: raw.flag(SECONDS),
            set_voltage: LcdSetpoint {
                value: raw.number::<3>(SET_VOLTAGE).map(|v| setpoint.raw_to_volts(v)),
                constant: raw.flag(SET_VOLTAGE + 6),
                bar: raw.flag(SET_VOLTAGE + 7),
                indicator: raw.flag(SET_VOLTAGE + 8),
            },
            set_current: LcdSetpoint {
                value: raw.number::<3>(SET_CURRENT).map(|v| setpoint.raw_to_amps(v)),
                constant: raw.flag(SET_CURRENT + 6),
                bar: raw.flag(SET_CURRENT + 7),
                indicator: raw.flag(SET_CURRENT + 8),
            },
            program: raw.segment(PROGRAM).digit(),
            program_on: raw.flag(PROGRAM_ON),
            program_bar: raw.flag(PROGRAM_BAR),
            setting: raw.flag(SETTING),
            key_lock: raw.flag(KEY_LOCK),
            key_open: raw.flag(KEY_OPEN),
            fault: raw.flag(FAULT),
            output_on: raw.flag(OUTPUT_ON),
            output_off: raw.flag(OUTPUT_OFF),
            remote: raw.flag(REMOTE),
        }
    }
}

/// Decode a complete `GPAL` response.
///
/// Fails only when the response has the wrong length. Unreadable digits are reported per field.
pub fn decode(buf: &[u8]) -> Result<LcdInfo, ProtocolError> {
    LcdRaw::from_response(buf).map(|raw| LcdInfo::from(&raw))
}
