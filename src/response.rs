//! Response framing and decoding.
//!
//! Every response ends with the literal `OK\r`. Responses carrying data put one or more
//! `\r` terminated records in front of it:
//!
//! ```text
//! OK\r                       no data
//! 150250\rOK\r               one record
//! 010100\r020200\r...OK\r    several records
//! ```
//!
//! [`classify`] tells whether an accumulating buffer holds a complete response yet, the
//! `decode_*` functions turn a complete one into typed values.

use fugit::SecsDurationU32;

use crate::{
    digits::parse_digits,
    error::ProtocolError,
    scaling::ScalingFactors,
    types::{OperatingMode, PRESET_COUNT, PROGRAM_COUNT, ProgramItem, VaData, VoltAmp},
};

/// Largest response the session buffers. The biggest one, all program items, is 223 bytes.
pub const RESPONSE_CAPACITY: usize = 256;

/// Terminates every response.
pub const OK_TERMINATOR: &[u8] = b"OK\r";

/// `uuuiii\r`
pub const PRESET_RECORD_LEN: usize = 7;
/// `uuuiiimmss\r`
pub const PROGRAM_RECORD_LEN: usize = 11;

/// Verdict of [`classify`] on a receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    /// Keep reading.
    Incomplete,
    /// Exactly `OK\r`.
    CompleteNoData,
    /// One or more records followed by `OK\r`.
    CompleteWithData,
}

/// Check whether `buf` holds a complete response.
///
/// Only the last four bytes are inspected. Responses never contain `OK\r` before their end, so
/// every proper prefix of a valid response classifies as [`ResponseStatus::Incomplete`].
pub fn classify(buf: &[u8]) -> ResponseStatus {
    if !buf.ends_with(OK_TERMINATOR) {
        return ResponseStatus::Incomplete;
    }

    match buf.len() {
        3 => ResponseStatus::CompleteNoData,
        len if buf[len - 4] == b'\r' => ResponseStatus::CompleteWithData,
        _ => ResponseStatus::Incomplete,
    }
}

/// What a complete response to an operation looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// Just `OK\r`.
    NoData,
    /// A single record of `data_len` bytes, then `\r` and `OK\r`.
    Fixed { data_len: usize },
    /// `count` records of `record_len` bytes each, `\r` included, then `OK\r`.
    Records { record_len: usize, count: usize },
}

impl ResponseShape {
    /// Total length of a complete response.
    pub const fn expected_len(&self) -> usize {
        match *self {
            ResponseShape::NoData => OK_TERMINATOR.len(),
            ResponseShape::Fixed { data_len } => data_len + 1 + OK_TERMINATOR.len(),
            ResponseShape::Records { record_len, count } => {
                record_len * count + OK_TERMINATOR.len()
            }
        }
    }

    /// The [`classify`] verdict a correct response produces.
    pub const fn expected_status(&self) -> ResponseStatus {
        match self {
            ResponseShape::NoData => ResponseStatus::CompleteNoData,
            _ => ResponseStatus::CompleteWithData,
        }
    }
}

/// Strip the terminators off a single record response after checking its length.
pub(crate) fn fixed_data(buf: &[u8], data_len: usize) -> Result<&[u8], ProtocolError> {
    let shape = ResponseShape::Fixed { data_len };
    if buf.len() != shape.expected_len() {
        return Err(ProtocolError::InvalidResponse);
    }
    Ok(&buf[..data_len])
}

/// Decode a `uuuiii` pair of setpoint fields.
fn decode_volt_amp(data: &[u8]) -> Result<VoltAmp, ProtocolError> {
    let scaling = ScalingFactors::SETPOINT;
    Ok(VoltAmp::new(
        scaling.raw_to_volts(parse_digits(&data[0..3])?),
        scaling.raw_to_amps(parse_digits(&data[3..6])?),
    ))
}

/// Decode a `uuuiiimmss` program record.
fn decode_program_item(data: &[u8]) -> Result<ProgramItem, ProtocolError> {
    let VoltAmp { voltage, current } = decode_volt_amp(&data[0..6])?;
    let minutes = parse_digits(&data[6..8])? as u32;
    let seconds = parse_digits(&data[8..10])? as u32;
    Ok(ProgramItem::new(
        voltage,
        current,
        SecsDurationU32::secs(minutes * 60 + seconds),
    ))
}

/// Decode a response of either one record or all `N` of them.
fn decode_records<T, const N: usize>(
    buf: &[u8],
    record_len: usize,
    decode: fn(&[u8]) -> Result<T, ProtocolError>,
) -> Result<heapless::Vec<T, N>, ProtocolError> {
    let single = ResponseShape::Records {
        record_len,
        count: 1,
    };
    let all = ResponseShape::Records {
        record_len,
        count: N,
    };
    if buf.len() != single.expected_len() && buf.len() != all.expected_len() {
        return Err(ProtocolError::InvalidResponse);
    }

    buf[..buf.len() - OK_TERMINATOR.len()]
        .chunks_exact(record_len)
        .map(|record| decode(&record[..record_len - 1]))
        .collect()
}

/// `GCOM`: `_aa\rOK\r`, the RS485 address the device answers to.
pub fn decode_device_address(buf: &[u8]) -> Result<u8, ProtocolError> {
    let data = fixed_data(buf, 3)?;
    Ok(parse_digits(&data[1..3])? as u8)
}

/// `GMAX`: `uuuiii\rOK\r`, the highest settable voltage and current.
pub fn decode_va_maximums(buf: &[u8]) -> Result<VoltAmp, ProtocolError> {
    decode_volt_amp(fixed_data(buf, 6)?)
}

/// `GETS`: `uuuiii\rOK\r`, the active voltage and current setpoint.
pub fn decode_va_setpoint(buf: &[u8]) -> Result<VoltAmp, ProtocolError> {
    decode_volt_amp(fixed_data(buf, 6)?)
}

/// `GOVP`: `uuu\rOK\r`, the upper voltage limit in volts.
pub fn decode_voltage_limit(buf: &[u8]) -> Result<f64, ProtocolError> {
    let data = fixed_data(buf, 3)?;
    Ok(ScalingFactors::SETPOINT.raw_to_volts(parse_digits(data)?))
}

/// `GETD`: `uuuuiiiim\rOK\r`, the measured output and regulation mode.
pub fn decode_va_data(buf: &[u8]) -> Result<VaData, ProtocolError> {
    let data = fixed_data(buf, 9)?;
    let scaling = ScalingFactors::MEASURED;
    Ok(VaData {
        voltage: scaling.raw_to_volts(parse_digits(&data[0..4])?),
        current: scaling.raw_to_amps(parse_digits(&data[4..8])?),
        mode: OperatingMode::try_from(parse_digits(&data[8..9])?)?,
    })
}

/// `GETM`: one or nine `uuuiii\r` records, in preset order.
pub fn decode_presets(buf: &[u8]) -> Result<heapless::Vec<VoltAmp, PRESET_COUNT>, ProtocolError> {
    decode_records(buf, PRESET_RECORD_LEN, decode_volt_amp)
}

/// `GETP`: one or twenty `uuuiiimmss\r` records, in program order.
pub fn decode_programs(
    buf: &[u8],
) -> Result<heapless::Vec<ProgramItem, PROGRAM_COUNT>, ProtocolError> {
    decode_records(buf, PROGRAM_RECORD_LEN, decode_program_item)
}
