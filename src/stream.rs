//! Output side of the pipeline: the [`Sink`] abstraction and the buffered
//! [`OutputStream`] the codec writes through.

use std::io::{self, Seek, SeekFrom, Write};

use crate::constants::STREAM_BUFFER_SIZE;
use crate::error::EncodeError;

/// Seekable byte destination for encoded output.
///
/// Any `Write + Seek` type is a sink, so `File`, `Cursor<Vec<u8>>` and
/// `BufWriter<File>` all work directly.
pub trait Sink {
    /// Writes some prefix of `buf`, returning how many bytes were taken.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
    /// Moves to an absolute position.
    fn seek(&mut self, position: u64) -> io::Result<()>;
    /// Moves relative to the current position; may move past the end.
    fn skip(&mut self, offset: i64) -> io::Result<()>;
}

impl<T: Write + Seek> Sink for T {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Write::write(self, buf)
    }

    fn seek(&mut self, position: u64) -> io::Result<()> {
        Seek::seek(self, SeekFrom::Start(position)).map(|_| ())
    }

    fn skip(&mut self, offset: i64) -> io::Result<()> {
        Seek::seek(self, SeekFrom::Current(offset)).map(|_| ())
    }
}

/// Buffered writer over a [`Sink`].
///
/// Bytes are collected in memory and handed to the sink when the buffer is
/// full, before any seek or skip, and on [`OutputStream::flush`]. Dropping
/// the stream does not flush it.
pub struct OutputStream<'a> {
    sink: &'a mut dyn Sink,
    buffer: Vec<u8>,
    capacity: usize,
    position: u64,
}

impl<'a> OutputStream<'a> {
    pub fn new(sink: &'a mut dyn Sink) -> Result<Self, EncodeError> {
        Self::with_capacity(sink, STREAM_BUFFER_SIZE)
    }

    pub fn with_capacity(sink: &'a mut dyn Sink, capacity: usize) -> Result<Self, EncodeError> {
        let capacity = capacity.max(1);
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(capacity)
            .map_err(|_| EncodeError::StreamCreationFailed)?;
        Ok(Self {
            sink,
            buffer,
            capacity,
            position: 0,
        })
    }

    /// Logical position of the next byte written.
    pub fn tell(&self) -> u64 {
        self.position
    }

    pub fn write(&mut self, mut data: &[u8]) -> io::Result<()> {
        while !data.is_empty() {
            let room = self.capacity - self.buffer.len();
            if room == 0 {
                self.flush()?;
                continue;
            }
            let n = room.min(data.len());
            self.buffer.extend_from_slice(&data[..n]);
            self.position += n as u64;
            data = &data[n..];
        }
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> io::Result<()> {
        self.write(&[value])
    }

    pub fn write_u16(&mut self, value: u16) -> io::Result<()> {
        self.write(&value.to_be_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> io::Result<()> {
        self.write(&value.to_be_bytes())
    }

    pub fn seek(&mut self, position: u64) -> io::Result<()> {
        self.flush()?;
        self.sink.seek(position)?;
        self.position = position;
        Ok(())
    }

    pub fn skip(&mut self, offset: i64) -> io::Result<()> {
        self.flush()?;
        let position = self
            .position
            .checked_add_signed(offset)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "skip before the start of the stream"))?;
        self.sink.skip(offset)?;
        self.position = position;
        Ok(())
    }

    /// Hands every buffered byte to the sink.
    pub fn flush(&mut self) -> io::Result<()> {
        let mut pending = &self.buffer[..];
        while !pending.is_empty() {
            match self.sink.write(pending) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "sink accepted no bytes",
                    ));
                }
                Ok(n) => pending = &pending[n..],
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        self.buffer.clear();
        Ok(())
    }
}
