//! We use this mocking module in unit tests to emulate a serial port.

use thiserror::Error;

const MOCK_CAPACITY: usize = 512;

/// Our mock type used to emulate a serial port.
pub struct MockSerial {
    /// Everything written to the port.
    write_buffer: heapless::Vec<u8, MOCK_CAPACITY>,
    /// Pre-configured response data to be read.
    read_buffer: heapless::Vec<u8, MOCK_CAPACITY>,
    /// Current position in the read buffer.
    read_position: usize,
    /// Upper bound on the bytes returned by a single read.
    read_chunk: usize,
    /// Upper bound on the bytes accepted by a single write.
    write_limit: Option<usize>,
    /// Number of reads that fail with `Interrupted` before data flows.
    pending_interrupts: usize,
    should_error_on_write: bool,
    should_error_on_read: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MockSerialError {
    /// No data within the port timeout.
    #[error("timed out")]
    Timeout,
    #[error("interrupted")]
    Interrupted,
    #[error("buffer overflow")]
    BufferOverflow,
    /// Generic simulated failure.
    #[error("simulated error")]
    SimulatedError,
}

impl embedded_io::Error for MockSerialError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            MockSerialError::Timeout => embedded_io::ErrorKind::TimedOut,
            MockSerialError::Interrupted => embedded_io::ErrorKind::Interrupted,
            MockSerialError::BufferOverflow => embedded_io::ErrorKind::OutOfMemory,
            MockSerialError::SimulatedError => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for MockSerial {
    type Error = MockSerialError;
}

impl embedded_io::Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.should_error_on_write {
            return Err(MockSerialError::SimulatedError);
        }

        let accepted = match self.write_limit {
            Some(limit) => &buf[..buf.len().min(limit)],
            None => buf,
        };
        self.write_buffer
            .extend_from_slice(accepted)
            .map_err(|_| MockSerialError::BufferOverflow)?;

        Ok(accepted.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if self.should_error_on_write {
            return Err(MockSerialError::SimulatedError);
        }
        Ok(())
    }
}

impl embedded_io::Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.should_error_on_read {
            return Err(MockSerialError::SimulatedError);
        }

        if self.pending_interrupts > 0 {
            self.pending_interrupts -= 1;
            return Err(MockSerialError::Interrupted);
        }

        if self.read_position >= self.read_buffer.len() {
            return Err(MockSerialError::Timeout);
        }

        let available_bytes = self.read_buffer.len() - self.read_position;
        let bytes_to_read = buf.len().min(available_bytes).min(self.read_chunk);

        buf[..bytes_to_read].copy_from_slice(
            &self.read_buffer[self.read_position..self.read_position + bytes_to_read],
        );

        self.read_position += bytes_to_read;
        Ok(bytes_to_read)
    }
}

impl embedded_io::ReadReady for MockSerial {
    /// Ready while data is queued or the next read is set up to fail.
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(self.should_error_on_read
            || self.pending_interrupts > 0
            || self.read_position < self.read_buffer.len())
    }
}

impl MockSerial {
    /// Create a new MockSerial instance with empty buffers.
    pub fn new() -> Self {
        Self {
            write_buffer: heapless::Vec::new(),
            read_buffer: heapless::Vec::new(),
            read_position: 0,
            read_chunk: usize::MAX,
            write_limit: None,
            pending_interrupts: 0,
            should_error_on_write: false,
            should_error_on_read: false,
        }
    }

    /// Create a port that answers with `data`.
    pub fn with_response(data: &[u8]) -> Self {
        let mut mock = Self::new();
        mock.set_read_data(data).unwrap();
        mock
    }

    /// Set the data that will be returned when read() is called.
    pub fn set_read_data(&mut self, data: &[u8]) -> Result<(), MockSerialError> {
        self.read_buffer.clear();
        self.read_position = 0;
        self.read_buffer
            .extend_from_slice(data)
            .map_err(|_| MockSerialError::BufferOverflow)
    }

    /// Queue more data behind whatever is still unread.
    pub fn append_read_data(&mut self, data: &[u8]) -> Result<(), MockSerialError> {
        self.read_buffer
            .extend_from_slice(data)
            .map_err(|_| MockSerialError::BufferOverflow)
    }

    /// Get a reference to the data that was written to this mock serial port.
    pub fn written_data(&self) -> &[u8] {
        &self.write_buffer
    }

    pub fn clear_written_data(&mut self) {
        self.write_buffer.clear();
    }

    /// Bytes queued for reading that nobody has read yet.
    pub fn unread(&self) -> &[u8] {
        &self.read_buffer[self.read_position..]
    }

    /// Hand out at most `chunk` bytes per read.
    pub fn set_read_chunk(&mut self, chunk: usize) {
        self.read_chunk = chunk.max(1);
    }

    /// Accept at most `limit` bytes per write.
    pub fn set_write_limit(&mut self, limit: Option<usize>) {
        self.write_limit = limit;
    }

    /// Fail the next `count` reads with `Interrupted`.
    pub fn set_interrupts(&mut self, count: usize) {
        self.pending_interrupts = count;
    }

    /// Configure whether write operations should fail with an error.
    pub fn set_write_error(&mut self, should_error: bool) {
        self.should_error_on_write = should_error;
    }

    /// Configure whether read operations should fail with an error.
    pub fn set_read_error(&mut self, should_error: bool) {
        self.should_error_on_read = should_error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::{Error, Read, ReadReady, Write};

    #[test]
    fn test_write_data() {
        let mut mock = MockSerial::new();
        assert_eq!(mock.write(b"GETD01\r"), Ok(7));
        assert_eq!(mock.write(b"STOP01\r"), Ok(7));
        assert_eq!(mock.written_data(), b"GETD01\rSTOP01\r");

        mock.clear_written_data();
        assert!(mock.written_data().is_empty());
    }

    #[test]
    fn test_write_limit() {
        let mut mock = MockSerial::new();
        mock.set_write_limit(Some(4));
        assert_eq!(mock.write(b"GETD01\r"), Ok(4));
        assert_eq!(mock.written_data(), b"GETD");
    }

    #[test]
    fn test_write_buffer_overflow() {
        let mut mock = MockSerial::new();
        let large_data = [0u8; MOCK_CAPACITY + 1];
        assert_eq!(mock.write(&large_data), Err(MockSerialError::BufferOverflow));
    }

    #[test]
    fn test_read_in_chunks() {
        let mut mock = MockSerial::with_response(b"150250\rOK\r");
        mock.set_read_chunk(4);

        let mut buffer = [0u8; 16];
        assert_eq!(mock.read(&mut buffer), Ok(4));
        assert_eq!(&buffer[..4], b"1502");
        assert_eq!(mock.unread(), b"50\rOK\r");
        assert_eq!(mock.read(&mut buffer), Ok(4));
        assert_eq!(mock.read(&mut buffer), Ok(2));
        assert_eq!(&buffer[..2], b"K\r");
    }

    #[test]
    fn test_read_ready() {
        let mut mock = MockSerial::new();
        assert_eq!(mock.read_ready(), Ok(false));

        mock.set_interrupts(1);
        assert_eq!(mock.read_ready(), Ok(true));
        let mut buffer = [0u8; 4];
        assert_eq!(mock.read(&mut buffer), Err(MockSerialError::Interrupted));
        assert_eq!(mock.read_ready(), Ok(false));

        mock.set_read_data(b"OK\r").unwrap();
        assert_eq!(mock.read_ready(), Ok(true));
        assert_eq!(mock.read(&mut buffer), Ok(3));
        assert_eq!(mock.read_ready(), Ok(false));

        mock.set_read_error(true);
        assert_eq!(mock.read_ready(), Ok(true));
    }

    #[test]
    fn test_read_times_out_when_exhausted() {
        let mut mock = MockSerial::with_response(b"OK\r");
        let mut buffer = [0u8; 10];
        assert_eq!(mock.read(&mut buffer), Ok(3));
        assert_eq!(mock.read(&mut buffer), Err(MockSerialError::Timeout));

        mock.append_read_data(b"OK\r").unwrap();
        assert_eq!(mock.read(&mut buffer), Ok(3));
    }

    #[test]
    fn test_interrupts_come_first() {
        let mut mock = MockSerial::with_response(b"OK\r");
        mock.set_interrupts(2);

        let mut buffer = [0u8; 10];
        assert_eq!(mock.read(&mut buffer), Err(MockSerialError::Interrupted));
        assert_eq!(mock.read(&mut buffer), Err(MockSerialError::Interrupted));
        assert_eq!(mock.read(&mut buffer), Ok(3));
    }

    #[test]
    fn test_error_simulation() {
        let mut mock = MockSerial::with_response(b"OK\r");
        mock.set_write_error(true);
        mock.set_read_error(true);

        let mut buffer = [0u8; 10];
        assert_eq!(mock.write(b"test"), Err(MockSerialError::SimulatedError));
        assert_eq!(mock.flush(), Err(MockSerialError::SimulatedError));
        assert_eq!(mock.read(&mut buffer), Err(MockSerialError::SimulatedError));
        assert!(mock.written_data().is_empty());

        mock.set_read_error(false);
        assert_eq!(mock.read(&mut buffer), Ok(3));
    }

    #[test]
    fn test_error_kinds() {
        use embedded_io::ErrorKind;
        assert_eq!(MockSerialError::Timeout.kind(), ErrorKind::TimedOut);
        assert_eq!(MockSerialError::Interrupted.kind(), ErrorKind::Interrupted);
        assert_eq!(MockSerialError::BufferOverflow.kind(), ErrorKind::OutOfMemory);
        assert_eq!(MockSerialError::SimulatedError.kind(), ErrorKind::Other);
    }
}
