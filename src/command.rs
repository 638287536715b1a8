//! Command templates and the command encoder.
//!
//! Every SDP command is a fixed ASCII pattern: a four letter mnemonic, the two digit device
//! address and zero or more fixed width decimal parameters, terminated by `\r`. E.g. setting
//! 1.5 V on device 1 is `VOLT01015\r`.
//!
//! Each [`Operation`] owns exactly one [`Template`] describing that pattern, and each template
//! names the byte range of every parameter field. [`Command`] carries the typed parameters of an
//! operation and range checks them while encoding.

use core::ops::{Deref, Range};

use fugit::SecsDurationU32;
use strum_macros::{EnumCount, EnumIter};

use crate::{
    digits::print_digits,
    error::ProtocolError,
    response::ResponseShape,
    scaling::ScalingFactors,
    types::{
        Address, DURATION_MAX_SECS, Interface, PRESET_MAX, PRESET_MIN, PROGRAM_MAX, PROGRAM_MIN,
        Parameter, ProgramItem, REPEAT_MAX, RepeatCount, Selection, State, VoltAmp,
    },
};

/// Every command fits in this many bytes.
pub const FRAME_CAPACITY: usize = 20;

/// Byte offset of the device address in every command.
pub const ADDRESS_OFFSET: usize = 4;
/// Width of the device address field.
pub const ADDRESS_WIDTH: usize = 2;

/// Highest raw value of a three digit voltage or current field.
const RAW_SETPOINT_MAX: i64 = 999;

/// What a parameter field in a template holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// `uuu` - tenths of a volt.
    Voltage,
    /// `iii` - hundredths of an amp.
    Current,
    /// `l` or `ll` - preset memory number.
    PresetNumber,
    /// `ll` - program item number.
    ProgramNumber,
    /// `mm` - minutes part of a program item duration.
    Minutes,
    /// `ss` - seconds part of a program item duration.
    Seconds,
    /// `nnnn` - number of program repeats, `0000` meaning forever.
    RepeatCount,
}

/// A parameter field inside a command template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub kind: FieldKind,
    /// Byte offset from the start of the command.
    pub offset: usize,
    /// Number of decimal digits.
    pub width: usize,
}

impl Field {
    pub const fn new(kind: FieldKind, offset: usize, width: usize) -> Self {
        Self {
            kind,
            offset,
            width,
        }
    }

    /// Bytes of the command this field occupies.
    pub const fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.width
    }
}

/// Immutable description of one command on the wire.
#[derive(Debug, PartialEq, Eq)]
pub struct Template {
    /// The command with `_` as address placeholder and letters as parameter placeholders.
    pub pattern: &'static [u8],
    /// Parameter fields, left to right.
    pub fields: &'static [Field],
}

impl Template {
    const fn new(pattern: &'static [u8], fields: &'static [Field]) -> Self {
        Self { pattern, fields }
    }

    /// The four letter mnemonic, e.g. `VOLT`.
    pub fn mnemonic(&self) -> &'static [u8] {
        &self.pattern[..ADDRESS_OFFSET]
    }

    /// Length of the encoded command including the trailing `\r`.
    pub(crate) const fn len(&self) -> usize {
        self.pattern.len()
    }
}

use FieldKind as FK;

const SESS: Template = Template::new(b"SESS__\r", &[]);
const ENDS: Template = Template::new(b"ENDS__\r", &[]);
const CCOM_RS232: Template = Template::new(b"CCOM__000\r", &[]);
const CCOM_RS485: Template = Template::new(b"CCOM__001\r", &[]);
const GCOM: Template = Template::new(b"GCOM__\r", &[]);
const GMAX: Template = Template::new(b"GMAX__\r", &[]);
const GOVP: Template = Template::new(b"GOVP__\r", &[]);
const GETD: Template = Template::new(b"GETD__\r", &[]);
const GETS: Template = Template::new(b"GETS__\r", &[]);
const GETM_ALL: Template = Template::new(b"GETM__\r", &[]);
const GETM: Template = Template::new(b"GETM__ll\r", &[Field::new(FK::PresetNumber, 6, 2)]);
const GETP_ALL: Template = Template::new(b"GETP__\r", &[]);
const GETP: Template = Template::new(b"GETP__ll\r", &[Field::new(FK::ProgramNumber, 6, 2)]);
const GPAL: Template = Template::new(b"GPAL__\r", &[]);
const VOLT: Template = Template::new(b"VOLT__uuu\r", &[Field::new(FK::Voltage, 6, 3)]);
const CURR: Template = Template::new(b"CURR__iii\r", &[Field::new(FK::Current, 6, 3)]);
const SOVP: Template = Template::new(b"SOVP__uuu\r", &[Field::new(FK::Voltage, 6, 3)]);
// The output switch is inverted on the wire: 0 turns the output on.
const SOUT_ON: Template = Template::new(b"SOUT__0\r", &[]);
const SOUT_OFF: Template = Template::new(b"SOUT__1\r", &[]);
const POWW_ENABLE: Template = Template::new(b"POWW__ll0\r", &[Field::new(FK::PresetNumber, 6, 2)]);
const POWW_DISABLE: Template =
    Template::new(b"POWW__ll1\r", &[Field::new(FK::PresetNumber, 6, 2)]);
const PROM: Template = Template::new(
    b"PROM__luuuiii\r",
    &[
        Field::new(FK::PresetNumber, 6, 1),
        Field::new(FK::Voltage, 7, 3),
        Field::new(FK::Current, 10, 3),
    ],
);
const PROP: Template = Template::new(
    b"PROP__lluuuiiimmss\r",
    &[
        Field::new(FK::ProgramNumber, 6, 2),
        Field::new(FK::Voltage, 8, 3),
        Field::new(FK::Current, 11, 3),
        Field::new(FK::Minutes, 14, 2),
        Field::new(FK::Seconds, 16, 2),
    ],
);
const RUNM: Template = Template::new(b"RUNM__l\r", &[Field::new(FK::PresetNumber, 6, 1)]);
const RUNP: Template = Template::new(b"RUNP__nnnn\r", &[Field::new(FK::RepeatCount, 6, 4)]);
const STOP: Template = Template::new(b"STOP__\r", &[]);

/// Every distinct command the SDP understands.
///
/// Commands whose variants differ only in a fixed literal (e.g. output on/off) are separate
/// operations, each with its own template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumCount)]
pub enum Operation {
    /// `SESS` - lock the front panel and enter remote mode.
    RemoteOn,
    /// `ENDS` - leave remote mode.
    RemoteOff,
    /// `CCOM` - talk RS232 from now on.
    SelectRs232,
    /// `CCOM` - talk RS485 from now on.
    SelectRs485,
    /// `GCOM` - echo the RS485 address.
    GetDeviceAddress,
    /// `GMAX` - upper limits of the supply.
    GetVaMaximums,
    /// `GOVP` - upper voltage limit.
    GetVoltageLimit,
    /// `GETD` - measured output and regulation mode.
    GetVaData,
    /// `GETS` - voltage and current setpoint.
    GetVaSetpoint,
    /// `GETM` - all nine presets.
    GetPresetAll,
    /// `GETM` - a single preset.
    GetPreset,
    /// `GETP` - all twenty program items.
    GetProgramAll,
    /// `GETP` - a single program item.
    GetProgram,
    /// `GPAL` - raw dump of the LCD segments.
    GetLcdInfo,
    /// `VOLT` - voltage setpoint.
    SetVoltage,
    /// `CURR` - current setpoint.
    SetCurrent,
    /// `SOVP` - upper voltage limit.
    SetVoltageLimit,
    /// `SOUT` - switch the output on.
    SetOutputOn,
    /// `SOUT` - switch the output off.
    SetOutputOff,
    /// `POWW` - output on at power up for a preset.
    PowerOnOutputEnable,
    /// `POWW` - output off at power up for a preset.
    PowerOnOutputDisable,
    /// `PROM` - store a preset.
    SetPreset,
    /// `PROP` - store a program item.
    SetProgram,
    /// `RUNM` - recall a preset.
    RunPreset,
    /// `RUNP` - start the timed program.
    RunProgram,
    /// `STOP` - stop the timed program.
    Stop,
}

impl Operation {
    /// The wire template of this operation.
    pub const fn template(self) -> &'static Template {
        use Operation as Op;
        match self {
            Op::RemoteOn => &SESS,
            Op::RemoteOff => &ENDS,
            Op::SelectRs232 => &CCOM_RS232,
            Op::SelectRs485 => &CCOM_RS485,
            Op::GetDeviceAddress => &GCOM,
            Op::GetVaMaximums => &GMAX,
            Op::GetVoltageLimit => &GOVP,
            Op::GetVaData => &GETD,
            Op::GetVaSetpoint => &GETS,
            Op::GetPresetAll => &GETM_ALL,
            Op::GetPreset => &GETM,
            Op::GetProgramAll => &GETP_ALL,
            Op::GetProgram => &GETP,
            Op::GetLcdInfo => &GPAL,
            Op::SetVoltage => &VOLT,
            Op::SetCurrent => &CURR,
            Op::SetVoltageLimit => &SOVP,
            Op::SetOutputOn => &SOUT_ON,
            Op::SetOutputOff => &SOUT_OFF,
            Op::PowerOnOutputEnable => &POWW_ENABLE,
            Op::PowerOnOutputDisable => &POWW_DISABLE,
            Op::SetPreset => &PROM,
            Op::SetProgram => &PROP,
            Op::RunPreset => &RUNM,
            Op::RunProgram => &RUNP,
            Op::Stop => &STOP,
        }
    }

    /// What the device answers to this operation.
    pub const fn response_shape(self) -> ResponseShape {
        use Operation as Op;
        match self {
            Op::GetDeviceAddress => ResponseShape::Fixed { data_len: 3 },
            Op::GetVaMaximums | Op::GetVaSetpoint => ResponseShape::Fixed { data_len: 6 },
            Op::GetVoltageLimit => ResponseShape::Fixed { data_len: 3 },
            Op::GetVaData => ResponseShape::Fixed { data_len: 9 },
            Op::GetLcdInfo => ResponseShape::Fixed {
                data_len: crate::lcd::LCD_DATA_LEN,
            },
            Op::GetPresetAll => ResponseShape::Records {
                record_len: crate::response::PRESET_RECORD_LEN,
                count: crate::types::PRESET_COUNT,
            },
            Op::GetPreset => ResponseShape::Records {
                record_len: crate::response::PRESET_RECORD_LEN,
                count: 1,
            },
            Op::GetProgramAll => ResponseShape::Records {
                record_len: crate::response::PROGRAM_RECORD_LEN,
                count: crate::types::PROGRAM_COUNT,
            },
            Op::GetProgram => ResponseShape::Records {
                record_len: crate::response::PROGRAM_RECORD_LEN,
                count: 1,
            },
            Op::RemoteOn
            | Op::RemoteOff
            | Op::SelectRs232
            | Op::SelectRs485
            | Op::SetVoltage
            | Op::SetCurrent
            | Op::SetVoltageLimit
            | Op::SetOutputOn
            | Op::SetOutputOff
            | Op::PowerOnOutputEnable
            | Op::PowerOnOutputDisable
            | Op::SetPreset
            | Op::SetProgram
            | Op::RunPreset
            | Op::RunProgram
            | Op::Stop => ResponseShape::NoData,
        }
    }
}

/// An encoded command, ready to be written to the serial line.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    bytes: [u8; FRAME_CAPACITY],
    len: usize,
}

impl Frame {
    fn from_template(template: &Template) -> Self {
        let mut bytes = [0u8; FRAME_CAPACITY];
        bytes[..template.len()].copy_from_slice(template.pattern);
        Self {
            bytes,
            len: template.len(),
        }
    }

    fn print(&mut self, range: Range<usize>, value: u16) {
        print_digits(&mut self.bytes[range], value);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

impl Deref for Frame {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_bytes()
    }
}

impl core::fmt::Debug for Frame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Frame(\"{}\")", self.as_bytes().escape_ascii())
    }
}

/// A typed request for the power supply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Enter (`On`) or leave (`Off`) remote mode.
    Remote(State),
    SelectInterface(Interface),
    GetDeviceAddress,
    GetVaMaximums,
    GetVoltageLimit,
    GetVaData,
    GetVaSetpoint,
    /// Preset 1 - 9, or all of them.
    GetPreset(Selection),
    /// Program item 0 - 19, or all of them.
    GetProgram(Selection),
    GetLcdInfo,
    /// Volts, 0.0 - 99.9.
    SetVoltage(f64),
    /// Amps, 0.00 - 9.99.
    SetCurrent(f64),
    /// Volts, 0.0 - 99.9.
    SetVoltageLimit(f64),
    SetOutput(State),
    /// Whether the output comes up enabled when `preset` is active at power on.
    SetPowerOnOutput { preset: u8, output: State },
    SetPreset { preset: u8, value: VoltAmp },
    SetProgram { program: u8, item: ProgramItem },
    RunPreset(u8),
    RunProgram(RepeatCount),
    Stop,
}

impl Command {
    /// The operation, and therefore the template, this command is sent as.
    pub fn operation(&self) -> Operation {
        use Operation as Op;
        match *self {
            Command::Remote(State::On) => Op::RemoteOn,
            Command::Remote(State::Off) => Op::RemoteOff,
            Command::SelectInterface(Interface::Rs232) => Op::SelectRs232,
            Command::SelectInterface(Interface::Rs485) => Op::SelectRs485,
            Command::GetDeviceAddress => Op::GetDeviceAddress,
            Command::GetVaMaximums => Op::GetVaMaximums,
            Command::GetVoltageLimit => Op::GetVoltageLimit,
            Command::GetVaData => Op::GetVaData,
            Command::GetVaSetpoint => Op::GetVaSetpoint,
            Command::GetPreset(Selection::All) => Op::GetPresetAll,
            Command::GetPreset(Selection::One(_)) => Op::GetPreset,
            Command::GetProgram(Selection::All) => Op::GetProgramAll,
            Command::GetProgram(Selection::One(_)) => Op::GetProgram,
            Command::GetLcdInfo => Op::GetLcdInfo,
            Command::SetVoltage(_) => Op::SetVoltage,
            Command::SetCurrent(_) => Op::SetCurrent,
            Command::SetVoltageLimit(_) => Op::SetVoltageLimit,
            Command::SetOutput(State::On) => Op::SetOutputOn,
            Command::SetOutput(State::Off) => Op::SetOutputOff,
            Command::SetPowerOnOutput {
                output: State::On, ..
            } => Op::PowerOnOutputEnable,
            Command::SetPowerOnOutput {
                output: State::Off,
                ..
            } => Op::PowerOnOutputDisable,
            Command::SetPreset { .. } => Op::SetPreset,
            Command::SetProgram { .. } => Op::SetProgram,
            Command::RunPreset(_) => Op::RunPreset,
            Command::RunProgram(_) => Op::RunProgram,
            Command::Stop => Op::Stop,
        }
    }

    /// Encode this command for the device at `address`.
    ///
    /// Parameters are range checked first, nothing is clamped.
    pub fn encode(&self, address: Address) -> Result<Frame, ProtocolError> {
        let template = self.operation().template();

        // Raw field values, in the same order as `template.fields`.
        let values: &[(FieldKind, u16)] = match *self {
            Command::GetPreset(Selection::One(preset)) => {
                &[(FK::PresetNumber, encode_preset_number(preset)?)]
            }
            Command::GetProgram(Selection::One(program)) => {
                &[(FK::ProgramNumber, encode_program_number(program)?)]
            }
            Command::SetVoltage(volts) | Command::SetVoltageLimit(volts) => {
                &[(FK::Voltage, encode_voltage(volts)?)]
            }
            Command::SetCurrent(amps) => &[(FK::Current, encode_current(amps)?)],
            Command::SetPowerOnOutput { preset, .. } => {
                &[(FK::PresetNumber, encode_preset_number(preset)?)]
            }
            Command::SetPreset { preset, value } => &[
                (FK::PresetNumber, encode_preset_number(preset)?),
                (FK::Voltage, encode_voltage(value.voltage)?),
                (FK::Current, encode_current(value.current)?),
            ],
            Command::SetProgram { program, item } => {
                let (minutes, seconds) = encode_duration(item.duration)?;
                &[
                    (FK::ProgramNumber, encode_program_number(program)?),
                    (FK::Voltage, encode_voltage(item.voltage)?),
                    (FK::Current, encode_current(item.current)?),
                    (FK::Minutes, minutes),
                    (FK::Seconds, seconds),
                ]
            }
            Command::RunPreset(preset) => &[(FK::PresetNumber, encode_preset_number(preset)?)],
            Command::RunProgram(count) => &[(FK::RepeatCount, encode_repeat_count(count)?)],
            _ => &[],
        };
        debug_assert_eq!(values.len(), template.fields.len());

        let mut frame = Frame::from_template(template);
        frame.print(
            ADDRESS_OFFSET..ADDRESS_OFFSET + ADDRESS_WIDTH,
            address.get() as u16,
        );
        for (field, &(kind, value)) in template.fields.iter().zip(values) {
            debug_assert_eq!(field.kind, kind, "{:?}", self.operation());
            frame.print(field.range(), value);
        }

        Ok(frame)
    }
}

/// Volts to the raw `uuu` field, tenths of a volt.
pub fn encode_voltage(volts: f64) -> Result<u16, ProtocolError> {
    ScalingFactors::SETPOINT
        .volts_to_raw(volts)
        .filter(|raw| (0..=RAW_SETPOINT_MAX).contains(raw))
        .map(|raw| raw as u16)
        .ok_or(ProtocolError::ParameterOutOfRange {
            parameter: Parameter::Voltage,
        })
}

/// Amps to the raw `iii` field, hundredths of an amp.
pub fn encode_current(amps: f64) -> Result<u16, ProtocolError> {
    ScalingFactors::SETPOINT
        .amps_to_raw(amps)
        .filter(|raw| (0..=RAW_SETPOINT_MAX).contains(raw))
        .map(|raw| raw as u16)
        .ok_or(ProtocolError::ParameterOutOfRange {
            parameter: Parameter::Current,
        })
}

fn encode_preset_number(preset: u8) -> Result<u16, ProtocolError> {
    if (PRESET_MIN..=PRESET_MAX).contains(&preset) {
        Ok(preset as u16)
    } else {
        Err(ProtocolError::ParameterOutOfRange {
            parameter: Parameter::PresetNumber,
        })
    }
}

fn encode_program_number(program: u8) -> Result<u16, ProtocolError> {
    if (PROGRAM_MIN..=PROGRAM_MAX).contains(&program) {
        Ok(program as u16)
    } else {
        Err(ProtocolError::ParameterOutOfRange {
            parameter: Parameter::ProgramNumber,
        })
    }
}

/// Split a program item duration into its `mm` and `ss` fields.
fn encode_duration(duration: SecsDurationU32) -> Result<(u16, u16), ProtocolError> {
    let secs = duration.to_secs();
    if secs > DURATION_MAX_SECS {
        return Err(ProtocolError::ParameterOutOfRange {
            parameter: Parameter::Duration,
        });
    }
    Ok(((secs / 60) as u16, (secs % 60) as u16))
}

fn encode_repeat_count(count: RepeatCount) -> Result<u16, ProtocolError> {
    match count {
        RepeatCount::Infinite => Ok(0),
        RepeatCount::Times(times) if (1..=REPEAT_MAX).contains(&times) => Ok(times),
        RepeatCount::Times(_) => Err(ProtocolError::ParameterOutOfRange {
            parameter: Parameter::RepeatCount,
        }),
    }
}
