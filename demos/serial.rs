use std::{
    collections::VecDeque,
    env,
    io::Read as _,
    sync::mpsc,
    thread,
};

use flexi_logger::Logger;
use inquire::Select;
use log::{error, info};
use manson_sdp::{
    channel::Split,
    error::Error,
    psu::SdpPsu,
    types::{Address, State},
};
use serialport::SerialPort;

// Configuration constants - adjust these for your setup
const SERIAL_TIMEOUT_MS: u64 = 50;
const DEVICE_ADDRESS: i32 = 1;
const OUTPUT_VOLTAGE_V: f64 = 5.0;
const CURRENT_LIMIT_A: f64 = 0.1;
const STABILIZATION_DELAY_MS: u64 = 1000;

#[derive(Debug)]
pub struct IoError(std::io::Error);

impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl embedded_io::Error for IoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        use embedded_io::ErrorKind as Kind;
        use std::io::ErrorKind as Std;
        match self.0.kind() {
            Std::NotFound => Kind::NotFound,
            Std::PermissionDenied => Kind::PermissionDenied,
            Std::BrokenPipe => Kind::BrokenPipe,
            Std::InvalidInput => Kind::InvalidInput,
            Std::InvalidData => Kind::InvalidData,
            // serialport reports a read without data within its timeout as TimedOut.
            Std::TimedOut | Std::WouldBlock => Kind::TimedOut,
            Std::Interrupted => Kind::Interrupted,
            Std::Unsupported => Kind::Unsupported,
            Std::OutOfMemory => Kind::OutOfMemory,
            _ => Kind::Other,
        }
    }
}

pub struct PortWrapper(Box<dyn SerialPort>);

impl embedded_io::ErrorType for PortWrapper {
    type Error = IoError;
}

impl embedded_io::Read for PortWrapper {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        std::io::Read::read(&mut self.0, buf).map_err(IoError)
    }
}

impl embedded_io::ReadReady for PortWrapper {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        let waiting = self.0.bytes_to_read().map_err(|e| IoError(e.into()))?;
        Ok(waiting > 0)
    }
}

impl embedded_io::Write for PortWrapper {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        std::io::Write::write(&mut self.0, buf).map_err(IoError)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        std::io::Write::flush(&mut self.0).map_err(IoError)
    }
}

/// Reading half for talking to a simulator over a pipe.
///
/// Stdin has no readiness query, so a background thread does the blocking reads.
pub struct StdinReader {
    incoming: mpsc::Receiver<std::io::Result<Vec<u8>>>,
    pending: VecDeque<u8>,
}

impl StdinReader {
    pub fn spawn() -> Self {
        let (tx, incoming) = mpsc::channel();
        thread::spawn(move || {
            let mut stdin = std::io::stdin();
            let mut buf = [0u8; 64];
            loop {
                let chunk = match stdin.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => Ok(buf[..n].to_vec()),
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => Err(e),
                };
                let failed = chunk.is_err();
                if tx.send(chunk).is_err() || failed {
                    break;
                }
            }
        });
        Self {
            incoming,
            pending: VecDeque::new(),
        }
    }

    fn collect(&mut self) -> Result<(), IoError> {
        while let Ok(chunk) = self.incoming.try_recv() {
            self.pending.extend(chunk.map_err(IoError)?);
        }
        Ok(())
    }
}

impl embedded_io::ErrorType for StdinReader {
    type Error = IoError;
}

impl embedded_io::Read for StdinReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.collect()?;
        if self.pending.is_empty() {
            return Err(IoError(std::io::ErrorKind::TimedOut.into()));
        }
        let count = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }
}

impl embedded_io::ReadReady for StdinReader {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        self.collect()?;
        Ok(!self.pending.is_empty())
    }
}

/// Writing half for talking to a simulator over a pipe.
pub struct StdoutWriter(std::io::Stdout);

impl embedded_io::ErrorType for StdoutWriter {
    type Error = IoError;
}

impl embedded_io::Write for StdoutWriter {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        std::io::Write::write(&mut self.0, buf).map_err(IoError)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        std::io::Write::flush(&mut self.0).map_err(IoError)
    }
}

fn exercise<S>(psu: &mut SdpPsu<S>) -> Result<(), Error<S::Error>>
where
    S: embedded_io::Read + embedded_io::ReadReady + embedded_io::Write,
{
    psu.remote(State::On)?;
    info!("Remote mode on, device address {}", psu.get_device_address()?);

    let maximums = psu.get_va_maximums()?;
    info!(
        "Maximums: {:.1} V, {:.2} A",
        maximums.voltage, maximums.current
    );
    info!("Voltage limit: {:.1} V", psu.get_voltage_limit()?);

    psu.set_voltage(OUTPUT_VOLTAGE_V)?;
    psu.set_current(CURRENT_LIMIT_A)?;
    let setpoint = psu.get_va_setpoint()?;
    info!(
        "Setpoint: {:.1} V, {:.2} A",
        setpoint.voltage, setpoint.current
    );

    psu.set_output(State::On)?;
    info!("Output enabled");

    // Wait for output to stabilize
    std::thread::sleep(std::time::Duration::from_millis(STABILIZATION_DELAY_MS));

    let measured = psu.get_va_data()?;
    info!(
        "Measured: {:.2} V, {:.3} A, {:?}",
        measured.voltage, measured.current, measured.mode
    );

    let lcd = psu.get_lcd_info()?;
    info!("Front panel: {lcd:#?}");

    for (idx, preset) in psu.get_presets()?.iter().enumerate() {
        info!(
            "Preset {}: {:.1} V, {:.2} A",
            idx + 1,
            preset.voltage,
            preset.current
        );
    }

    psu.set_output(State::Off)?;
    psu.remote(State::Off)?;
    info!("Output disabled, remote mode off");
    Ok(())
}

fn main() {
    let _log_handle = Logger::try_with_env_or_str("info")
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    let address = Address::new(DEVICE_ADDRESS).expect("Invalid device address");

    // Get serial port from command line arg or interactive selection, "-" for stdin/stdout.
    let port_name = env::args().nth(1).unwrap_or_else(|| {
        let ports = serialport::available_ports().expect("Failed to enumerate serial ports");

        if ports.is_empty() {
            error!("No serial ports found!");
            std::process::exit(1);
        }

        let port_names: Vec<String> = ports.iter().map(|p| p.port_name.clone()).collect();

        Select::new("Select a serial port:", port_names)
            .prompt()
            .expect("Failed to select port")
    });

    let outcome = if port_name == "-" {
        info!("Using stdin/stdout");
        let channel = Split::new(StdinReader::spawn(), StdoutWriter(std::io::stdout()));
        exercise(&mut SdpPsu::new(channel, address))
    } else {
        info!("Using port: {port_name}");
        let port = serialport::new(&port_name, manson_sdp::config::DEFAULT_BAUD_RATE)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .timeout(std::time::Duration::from_millis(SERIAL_TIMEOUT_MS))
            .open()
            .expect("Failed to open serial port");
        exercise(&mut SdpPsu::new(PortWrapper(port), address))
    };

    if let Err(e) = outcome {
        error!("{e}: {e:?}");
        std::process::exit(1);
    }
}
