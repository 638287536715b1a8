//! Byte channel adapters.
//!
//! A session talks to a single [`embedded_io`] port. Some platforms hand out separate receive
//! and transmit handles instead, e.g. a UART split into halves or a pair of pipes. [`Split`] glues
//! two such handles back into one port.

use embedded_io::{ErrorType, Read, ReadReady, Write};

/// A read half and a write half used together as one channel.
///
/// Both halves have to report the same error type. Dropping the `Split` drops each half once.
#[derive(Debug)]
pub struct Split<R, W> {
    reader: R,
    writer: W,
}

impl<R, W> Split<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    pub fn reader_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    pub fn writer_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Take the two halves apart again.
    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

impl<R: ErrorType, W> ErrorType for Split<R, W> {
    type Error = R::Error;
}

impl<R, W> Read for Split<R, W>
where
    R: Read,
    W: ErrorType<Error = R::Error>,
{
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.reader.read(buf)
    }
}

impl<R, W> ReadReady for Split<R, W>
where
    R: ReadReady,
    W: ErrorType<Error = R::Error>,
{
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        self.reader.read_ready()
    }
}

impl<R, W> Write for Split<R, W>
where
    R: ErrorType,
    W: Write<Error = R::Error>,
{
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.writer.flush()
    }
}
