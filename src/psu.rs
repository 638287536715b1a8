use std::{
    thread,
    time::{Duration, Instant},
};

use embedded_io::{Error as _, ErrorKind};
use log::{debug, trace, warn};

use crate::{
    command::{Command, Frame},
    config::SdpConfig,
    error::{Error, ProtocolError, Result},
    lcd::{self, LcdInfo},
    response::{
        RESPONSE_CAPACITY, ResponseShape, ResponseStatus, classify, decode_device_address,
        decode_presets, decode_programs, decode_va_data, decode_va_maximums, decode_va_setpoint,
        decode_voltage_limit,
    },
    types::{
        Address, Interface, PRESET_COUNT, PROGRAM_COUNT, ProgramItem, RepeatCount, Selection,
        State, VaData, VoltAmp,
    },
};

/// Pause between readiness checks while the channel is idle.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Raw bytes of one complete response, `OK\r` included.
pub type ResponseBuffer = heapless::Vec<u8, RESPONSE_CAPACITY>;

/// You can create a SdpPsu using any channel which implements [embedded_io::Read],
/// [embedded_io::ReadReady] & [embedded_io::Write].
///
/// The channel should be configured for 9600 baud, 8N1. The session only reads once the channel
/// reports data as ready, and gives up with [Error::Timeout] when nothing completes the response
/// before its deadline, see [SdpConfig::response_timeout]. A silent peer never hangs a call.
///
/// Each method performs one complete command/response exchange. We use the nomenclature that
/// "set" writes a setting and "get" reads one back.
pub struct SdpPsu<S: embedded_io::Read + embedded_io::ReadReady + embedded_io::Write> {
    interface: S,
    /// Ignored by RS232 devices. Default is 1.
    address: Address,
    config: SdpConfig,
}

impl<S: embedded_io::Read + embedded_io::ReadReady + embedded_io::Write> SdpPsu<S> {
    /// Create a new session with the default timing.
    pub fn new(interface: S, address: Address) -> Self {
        Self::with_config(interface, address, SdpConfig::default())
    }

    pub fn with_config(interface: S, address: Address, config: SdpConfig) -> Self {
        Self {
            interface,
            address,
            config,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Talk to another device on the same RS485 bus.
    pub fn set_address(&mut self, address: Address) {
        self.address = address;
    }

    pub fn config(&self) -> &SdpConfig {
        &self.config
    }

    /// End the session and hand back the channel.
    pub fn into_inner(self) -> S {
        self.interface
    }

    /// Enter (lock the front panel) or leave remote mode.
    pub fn remote(&mut self, state: impl Into<State>) -> Result<(), S::Error> {
        self.execute_no_data(Command::Remote(state.into()))
    }

    /// Switch the device to another serial interface.
    ///
    /// The device keeps answering on the interface the command came in on.
    pub fn select_interface(&mut self, interface: Interface) -> Result<(), S::Error> {
        self.execute_no_data(Command::SelectInterface(interface))
    }

    /// Read back the RS485 address of the device.
    pub fn get_device_address(&mut self) -> Result<u8, S::Error> {
        let response = self.execute(Command::GetDeviceAddress)?;
        Ok(decode_device_address(&response)?)
    }

    /// Return the highest voltage and current the supply can deliver.
    pub fn get_va_maximums(&mut self) -> Result<VoltAmp, S::Error> {
        let response = self.execute(Command::GetVaMaximums)?;
        Ok(decode_va_maximums(&response)?)
    }

    /// Return the upper voltage limit in volts.
    pub fn get_voltage_limit(&mut self) -> Result<f64, S::Error> {
        let response = self.execute(Command::GetVoltageLimit)?;
        Ok(decode_voltage_limit(&response)?)
    }

    /// Return the measured output voltage, current and regulation mode.
    pub fn get_va_data(&mut self) -> Result<VaData, S::Error> {
        let response = self.execute(Command::GetVaData)?;
        Ok(decode_va_data(&response)?)
    }

    /// Return the active voltage and current setpoint.
    pub fn get_va_setpoint(&mut self) -> Result<VoltAmp, S::Error> {
        let response = self.execute(Command::GetVaSetpoint)?;
        Ok(decode_va_setpoint(&response)?)
    }

    /// Return preset memory `preset`, 1 - 9.
    pub fn get_preset(&mut self, preset: u8) -> Result<VoltAmp, S::Error> {
        let response = self.execute(Command::GetPreset(Selection::One(preset)))?;
        let presets = decode_presets(&response)?;
        match presets.as_slice() {
            [value] => Ok(*value),
            _ => Err(self.unexpected_count(1, presets.len())),
        }
    }

    /// Return all nine preset memories, preset 1 first.
    pub fn get_presets(&mut self) -> Result<heapless::Vec<VoltAmp, PRESET_COUNT>, S::Error> {
        let response = self.execute(Command::GetPreset(Selection::All))?;
        let presets = decode_presets(&response)?;
        if presets.len() != PRESET_COUNT {
            return Err(self.unexpected_count(PRESET_COUNT, presets.len()));
        }
        Ok(presets)
    }

    /// Return timed program item `program`, 0 - 19.
    pub fn get_program(&mut self, program: u8) -> Result<ProgramItem, S::Error> {
        let response = self.execute(Command::GetProgram(Selection::One(program)))?;
        let items = decode_programs(&response)?;
        match items.as_slice() {
            [item] => Ok(*item),
            _ => Err(self.unexpected_count(1, items.len())),
        }
    }

    /// Return all twenty timed program items, item 0 first.
    pub fn get_programs(&mut self) -> Result<heapless::Vec<ProgramItem, PROGRAM_COUNT>, S::Error> {
        let response = self.execute(Command::GetProgram(Selection::All))?;
        let items = decode_programs(&response)?;
        if items.len() != PROGRAM_COUNT {
            return Err(self.unexpected_count(PROGRAM_COUNT, items.len()));
        }
        Ok(items)
    }

    /// Return everything currently shown on the front panel.
    pub fn get_lcd_info(&mut self) -> Result<LcdInfo, S::Error> {
        let response = self.execute(Command::GetLcdInfo)?;
        Ok(lcd::decode(&response)?)
    }

    /// Set the output voltage in volts, 0.0 - 99.9.
    pub fn set_voltage(&mut self, volts: f64) -> Result<(), S::Error> {
        self.execute_no_data(Command::SetVoltage(volts))
    }

    /// Set the current limit in amps, 0.00 - 9.99.
    pub fn set_current(&mut self, amps: f64) -> Result<(), S::Error> {
        self.execute_no_data(Command::SetCurrent(amps))
    }

    /// Set the upper voltage limit in volts.
    pub fn set_voltage_limit(&mut self, volts: f64) -> Result<(), S::Error> {
        self.execute_no_data(Command::SetVoltageLimit(volts))
    }

    /// Enable/disable the output.
    pub fn set_output(&mut self, state: impl Into<State>) -> Result<(), S::Error> {
        self.execute_no_data(Command::SetOutput(state.into()))
    }

    /// Choose whether the output comes up enabled when `preset` is active at power on.
    pub fn set_poweron_output(
        &mut self,
        preset: u8,
        state: impl Into<State>,
    ) -> Result<(), S::Error> {
        self.execute_no_data(Command::SetPowerOnOutput {
            preset,
            output: state.into(),
        })
    }

    /// Store `value` in preset memory `preset`.
    pub fn set_preset(&mut self, preset: u8, value: VoltAmp) -> Result<(), S::Error> {
        self.execute_no_data(Command::SetPreset { preset, value })
    }

    /// Store `item` as step `program` of the timed program.
    pub fn set_program(&mut self, program: u8, item: ProgramItem) -> Result<(), S::Error> {
        self.execute_no_data(Command::SetProgram { program, item })
    }

    /// Make preset `preset` the active setpoint.
    pub fn run_preset(&mut self, preset: u8) -> Result<(), S::Error> {
        self.execute_no_data(Command::RunPreset(preset))
    }

    /// Start the timed program.
    pub fn run_program(&mut self, count: RepeatCount) -> Result<(), S::Error> {
        self.execute_no_data(Command::RunProgram(count))
    }

    /// Stop the timed program.
    pub fn stop(&mut self) -> Result<(), S::Error> {
        self.execute_no_data(Command::Stop)
    }

    /// Send `command` and wait for the complete response, without interpreting it.
    pub fn transact(
        &mut self,
        command: &Command,
    ) -> Result<(ResponseStatus, ResponseBuffer), S::Error> {
        let frame = command.encode(self.address)?;
        self.send(&frame)?;
        self.receive(command.operation().response_shape())
    }

    /// Run an exchange and check the response is the kind the command produces.
    fn execute(&mut self, command: Command) -> Result<ResponseBuffer, S::Error> {
        let shape = command.operation().response_shape();
        let (status, response) = self.transact(&command)?;

        if status != shape.expected_status() {
            warn!(
                "{:?}: expected {:?}, got {:?} \"{}\"",
                command.operation(),
                shape.expected_status(),
                status,
                response.escape_ascii()
            );
            return Err(ProtocolError::InvalidResponse.into());
        }
        Ok(response)
    }

    fn execute_no_data(&mut self, command: Command) -> Result<(), S::Error> {
        self.execute(command).map(|_| ())
    }

    fn send(&mut self, frame: &Frame) -> Result<(), S::Error> {
        trace!("tx \"{}\"", frame.escape_ascii());

        let written = self.interface.write(frame).map_err(Error::SerialError)?;
        if written != frame.len() {
            warn!("short write, {written} of {} bytes", frame.len());
            return Err(Error::ShortWrite {
                written,
                expected: frame.len(),
            });
        }

        self.interface.flush().map_err(Error::SerialError)
    }

    /// Read until [classify] reports a complete response or the deadline passes.
    ///
    /// Never reads past the expected length, so a following response stays in the channel.
    fn receive(
        &mut self,
        shape: ResponseShape,
    ) -> Result<(ResponseStatus, ResponseBuffer), S::Error> {
        let expected_len = shape.expected_len().min(RESPONSE_CAPACITY);
        let timeout = self.config.response_timeout(shape.expected_len());
        let deadline = Instant::now() + timeout;
        debug!("waiting up to {timeout:?} for {expected_len} byte response");

        let mut response = ResponseBuffer::new();
        let mut chunk = [0u8; 32];
        loop {
            let room = (expected_len - response.len()).min(chunk.len());
            if room == 0 {
                warn!(
                    "no response terminator in {} bytes \"{}\"",
                    response.len(),
                    response.escape_ascii()
                );
                return Err(ProtocolError::InvalidResponse.into());
            }

            let ready = match self.interface.read_ready() {
                Ok(ready) => ready,
                Err(e) if e.kind() == ErrorKind::Interrupted => false,
                Err(e) => return Err(Error::SerialError(e)),
            };

            if ready {
                match self.interface.read(&mut chunk[..room]) {
                    Ok(count) => {
                        response
                            .extend_from_slice(&chunk[..count])
                            .map_err(|_| ProtocolError::InvalidResponse)?;

                        let status = classify(&response);
                        if status != ResponseStatus::Incomplete {
                            trace!("rx \"{}\"", response.escape_ascii());
                            debug!("{status:?} after {} bytes", response.len());
                            return Ok((status, response));
                        }
                    }
                    // Nothing arrived yet.
                    Err(e)
                        if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => {}
                    Err(e) => return Err(Error::SerialError(e)),
                }
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    "timed out after {timeout:?} with \"{}\"",
                    response.escape_ascii()
                );
                return Err(Error::Timeout);
            }
            if !ready {
                thread::sleep(POLL_INTERVAL.min(deadline - now));
            }
        }
    }

    fn unexpected_count(&self, expected: usize, received: usize) -> Error<S::Error> {
        warn!("expected {expected} records, got {received}");
        Error::Protocol(ProtocolError::InvalidResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        channel::Split,
        mock_serial::{MockSerial, MockSerialError},
        types::OperatingMode,
    };
    use assert_matches::assert_matches;
    use fugit::SecsDurationU32;

    fn psu_with(response: &[u8]) -> SdpPsu<MockSerial> {
        SdpPsu::new(MockSerial::with_response(response), Address::default())
    }

    fn quick_config() -> SdpConfig {
        SdpConfig::default().with_dead_time(Duration::from_millis(20))
    }

    #[test]
    fn test_set_voltage() {
        let mut psu = psu_with(b"OK\r");
        psu.set_voltage(1.5).unwrap();
        assert_eq!(psu.interface.written_data(), b"VOLT01015\r");
        assert!(psu.interface.unread().is_empty());
    }

    #[test]
    fn test_remote_session() {
        let mut psu = psu_with(b"OK\rOK\rOK\r");
        psu.remote(true).unwrap();
        psu.set_output(State::On).unwrap();
        psu.remote(State::Off).unwrap();
        assert_eq!(
            psu.interface.written_data(),
            b"SESS01\rSOUT010\rENDS01\r"
        );
    }

    #[test]
    fn test_address_is_used() {
        let address = Address::new(17).unwrap();
        let mut psu = SdpPsu::new(MockSerial::with_response(b"_17\rOK\r"), address);
        assert_eq!(psu.address(), address);
        assert_eq!(psu.get_device_address().unwrap(), 17);
        assert_eq!(psu.interface.written_data(), b"GCOM17\r");

        psu.set_address(Address::new(3).unwrap());
        psu.interface.append_read_data(b"OK\r").unwrap();
        psu.stop().unwrap();
        assert_eq!(psu.interface.written_data(), b"GCOM17\rSTOP03\r");
    }

    #[test]
    fn test_get_va_setpoint_byte_by_byte() {
        let mut psu = psu_with(b"150250\rOK\r");
        psu.interface.set_read_chunk(1);
        assert_eq!(psu.get_va_setpoint().unwrap(), VoltAmp::new(15.0, 2.5));
        assert_eq!(psu.interface.written_data(), b"GETS01\r");
    }

    #[test]
    fn test_get_va_data() {
        let mut psu = psu_with(b"123401231\rOK\r");
        let data = psu.get_va_data().unwrap();
        assert_eq!(data.voltage, 12.34);
        assert_eq!(data.current, 0.123);
        assert_eq!(data.mode, OperatingMode::Cc);
    }

    #[test]
    fn test_get_maximums_and_limit() {
        let mut psu = psu_with(b"999999\rOK\r420\rOK\r");
        assert_eq!(psu.get_va_maximums().unwrap(), VoltAmp::new(99.9, 9.99));
        assert_eq!(psu.get_voltage_limit().unwrap(), 42.0);
        assert_eq!(psu.interface.written_data(), b"GMAX01\rGOVP01\r");
    }

    #[test]
    fn test_reads_stop_at_the_response() {
        let mut psu = psu_with(b"999999\rOK\r420\rOK\r");
        assert_eq!(psu.get_va_maximums().unwrap(), VoltAmp::new(99.9, 9.99));
        assert_eq!(psu.interface.unread(), b"420\rOK\r");

        let mut psu = psu_with(b"OK\rOK\r");
        psu.stop().unwrap();
        assert_eq!(psu.interface.unread(), b"OK\r");
    }

    #[test]
    fn test_get_presets_in_chunks() {
        let mut psu = psu_with(
            b"010100\r020200\r030300\r040400\r050500\r060600\r070700\r080800\r090900\rOK\r",
        );
        psu.interface.set_read_chunk(5);

        let presets = psu.get_presets().unwrap();
        assert_eq!(presets.len(), 9);
        assert_eq!(presets[0], VoltAmp::new(1.0, 1.0));
        assert_eq!(presets[8], VoltAmp::new(9.0, 9.0));
        assert_eq!(psu.interface.written_data(), b"GETM01\r");
    }

    #[test]
    fn test_get_preset_rejects_wrong_count() {
        let mut psu = psu_with(
            b"010100\r020200\r030300\r040400\r050500\r060600\r070700\r080800\r090900\rOK\r",
        );
        assert_matches!(
            psu.get_preset(2),
            Err(Error::Protocol(ProtocolError::InvalidResponse))
        );
        assert_eq!(psu.interface.written_data(), b"GETM0102\r");
    }

    #[test]
    fn test_get_presets_rejects_single_record() {
        let mut psu = psu_with(b"010100\rOK\r");
        assert_matches!(
            psu.get_presets(),
            Err(Error::Protocol(ProtocolError::InvalidResponse))
        );
    }

    #[test]
    fn test_get_programs() {
        let mut dump = heapless::Vec::<u8, 256>::new();
        for _ in 0..PROGRAM_COUNT {
            dump.extend_from_slice(b"0500250130\r").unwrap();
        }
        dump.extend_from_slice(b"OK\r").unwrap();

        let mut psu = psu_with(&dump);
        psu.interface.set_read_chunk(7);
        let items = psu.get_programs().unwrap();
        assert_eq!(items.len(), PROGRAM_COUNT);
        for item in items {
            assert_eq!(item, ProgramItem::new(5.0, 0.25, SecsDurationU32::secs(90)));
        }
    }

    #[test]
    fn test_get_program() {
        let mut psu = psu_with(b"1230450210\rOK\r");
        let item = psu.get_program(19).unwrap();
        assert_eq!(item, ProgramItem::new(12.3, 0.45, SecsDurationU32::secs(130)));
        assert_eq!(psu.interface.written_data(), b"GETP0119\r");
    }

    #[test]
    fn test_program_setup() {
        let mut psu = psu_with(b"OK\rOK\rOK\rOK\r");
        let item = ProgramItem::new(5.0, 0.25, SecsDurationU32::secs(90));
        psu.set_program(7, item).unwrap();
        psu.set_preset(2, VoltAmp::new(12.3, 1.5)).unwrap();
        psu.run_program(RepeatCount::Infinite).unwrap();
        psu.run_preset(2).unwrap();
        assert_eq!(
            psu.interface.written_data(),
            b"PROP01070500250130\rPROM012123150\rRUNP010000\rRUNM012\r"
        );
    }

    #[test]
    fn test_limits_and_power_on() {
        let mut psu = psu_with(b"OK\rOK\rOK\rOK\r");
        psu.set_current(0.05).unwrap();
        psu.set_voltage_limit(30.0).unwrap();
        psu.set_poweron_output(3, true).unwrap();
        psu.select_interface(Interface::Rs485).unwrap();
        assert_eq!(
            psu.interface.written_data(),
            b"CURR01005\rSOVP01300\rPOWW01030\rCCOM01001\r"
        );
    }

    #[test]
    fn test_get_lcd_info() {
        let mut dump = [b'1'; 72];
        dump[68..].copy_from_slice(b"\rOK\r");
        // Set voltage "150", segments 0x06, 0x6d, 0x3f.
        dump[39..45].copy_from_slice(&[b'0', b'6', b'6', b'=', b'3', b'?']);
        // Output on indicator.
        dump[65] = b'0';

        let mut psu = psu_with(&dump);
        let info = psu.get_lcd_info().unwrap();
        assert_eq!(info.set_voltage.value, Ok(15.0));
        assert!(info.output_on);
        assert!(!info.remote);
        // "1" everywhere else is not a digit.
        assert_matches!(
            info.read_voltage.value,
            Err(ProtocolError::DecodeFailure { pattern: 0x11 })
        );
    }

    #[test]
    fn test_transact() {
        let mut psu = psu_with(b"150250\rOK\r");
        let (status, response) = psu.transact(&Command::GetVaSetpoint).unwrap();
        assert_eq!(status, ResponseStatus::CompleteWithData);
        assert_eq!(response.as_slice(), b"150250\rOK\r");
        assert_eq!(
            response.len(),
            Command::GetVaSetpoint
                .operation()
                .response_shape()
                .expected_len()
        );
        assert_eq!(decode_va_setpoint(&response), Ok(VoltAmp::new(15.0, 2.5)));
    }

    #[test]
    fn test_parameter_checked_before_sending() {
        let mut psu = psu_with(b"OK\r");
        assert_matches!(
            psu.set_voltage(100.0),
            Err(Error::Protocol(ProtocolError::ParameterOutOfRange { .. }))
        );
        assert_matches!(
            psu.run_preset(0),
            Err(Error::Protocol(ProtocolError::ParameterOutOfRange { .. }))
        );
        assert!(psu.interface.written_data().is_empty());
    }

    #[test]
    fn test_timeout_on_silence() {
        let config = quick_config();
        let mut psu = SdpPsu::with_config(MockSerial::new(), Address::default(), config);
        assert_eq!(psu.config(), &config);

        let started = Instant::now();
        assert_matches!(psu.get_va_data(), Err(Error::Timeout));
        assert!(started.elapsed() >= config.response_timeout(13));
        assert_eq!(psu.interface.written_data(), b"GETD01\r");
    }

    /// A port whose reads block far longer than any response deadline.
    struct StalledSerial {
        reads: usize,
    }

    impl embedded_io::ErrorType for StalledSerial {
        type Error = MockSerialError;
    }

    impl embedded_io::Read for StalledSerial {
        fn read(&mut self, _buf: &mut [u8]) -> core::result::Result<usize, Self::Error> {
            self.reads += 1;
            thread::sleep(Duration::from_secs(1));
            Err(MockSerialError::Timeout)
        }
    }

    impl embedded_io::ReadReady for StalledSerial {
        fn read_ready(&mut self) -> core::result::Result<bool, Self::Error> {
            Ok(false)
        }
    }

    impl embedded_io::Write for StalledSerial {
        fn write(&mut self, buf: &[u8]) -> core::result::Result<usize, Self::Error> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> core::result::Result<(), Self::Error> {
            Ok(())
        }
    }

    #[test]
    fn test_timeout_on_blocking_channel() {
        let config = quick_config();
        let mut psu = SdpPsu::with_config(StalledSerial { reads: 0 }, Address::default(), config);

        let started = Instant::now();
        assert_matches!(psu.get_va_data(), Err(Error::Timeout));
        let elapsed = started.elapsed();
        assert!(elapsed >= config.response_timeout(13));
        assert!(elapsed < Duration::from_millis(500));
        assert_eq!(psu.into_inner().reads, 0);
    }

    #[test]
    fn test_timeout_on_partial_response() {
        let mut dev = MockSerial::with_response(b"150250\rOK");
        dev.set_interrupts(3);
        let mut psu = SdpPsu::with_config(dev, Address::default(), quick_config());
        assert_matches!(psu.get_va_setpoint(), Err(Error::Timeout));
    }

    #[test]
    fn test_interrupted_reads_are_retried() {
        let mut psu = psu_with(b"OK\r");
        psu.interface.set_interrupts(5);
        psu.stop().unwrap();
    }

    #[test]
    fn test_short_write() {
        let mut psu = psu_with(b"OK\r");
        psu.interface.set_write_limit(Some(4));
        assert_matches!(
            psu.set_voltage(1.5),
            Err(Error::ShortWrite {
                written: 4,
                expected: 10
            })
        );
        // Nothing was read for the failed exchange.
        assert_eq!(psu.interface.unread(), b"OK\r");
    }

    #[test]
    fn test_serial_errors() {
        let mut psu = psu_with(b"OK\r");
        psu.interface.set_write_error(true);
        assert_matches!(
            psu.stop(),
            Err(Error::SerialError(MockSerialError::SimulatedError))
        );

        psu.interface.set_write_error(false);
        psu.interface.set_read_error(true);
        assert_matches!(
            psu.stop(),
            Err(Error::SerialError(MockSerialError::SimulatedError))
        );
    }

    #[test]
    fn test_unexpected_response_kind() {
        // Data for a command that expects none.
        let mut psu = psu_with(b"150\rOK\r");
        assert_matches!(
            psu.stop(),
            Err(Error::Protocol(ProtocolError::InvalidResponse))
        );

        // Bare acknowledgement for a query.
        let mut psu = psu_with(b"OK\r");
        assert_matches!(
            psu.get_va_setpoint(),
            Err(Error::Protocol(ProtocolError::InvalidResponse))
        );
    }

    #[test]
    fn test_runaway_response() {
        let mut psu = psu_with(&[b'0'; RESPONSE_CAPACITY + 10]);
        assert_matches!(
            psu.get_presets(),
            Err(Error::Protocol(ProtocolError::InvalidResponse))
        );
    }

    #[test]
    fn test_split_channel() {
        let channel = Split::new(MockSerial::with_response(b"_01\rOK\r"), MockSerial::new());
        let mut psu = SdpPsu::new(channel, Address::default());
        assert_eq!(psu.get_device_address().unwrap(), 1);

        let (reader, writer) = psu.into_inner().into_inner();
        assert_eq!(writer.written_data(), b"GCOM01\r");
        assert!(reader.written_data().is_empty());
    }
}
