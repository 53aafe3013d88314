//! Raw motion vector recording loader.
//!
//! A `.mvec` recording is a plain concatenation of encoder motion vector buffers, each holding
//! `rows * cols` 4-byte entries. There is no header, thus the reader needs to be told the frame
//! resolution.

use anyhow::{anyhow, Result};
use log::*;
use mvdetect::config::grid_dims;
use mvdetect::prelude::v1::{MotionVector, MotionVectorFrame};
use std::io::{BufReader, ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};

/// Open a file or an input stream.
///
/// `tcp://host:port` connects to a remote stream, while `tcp://@:port` listens on all interfaces
/// and accepts a single connection.
pub fn open_file(input: &str) -> Result<Box<dyn Read + Send>> {
    if let Some(input) = input.strip_prefix("tcp://") {
        let (addr, port) = input
            .split_once(':')
            .ok_or_else(|| anyhow!("Invalid format"))?;
        let port: u16 = str::parse(port)?;

        let stream = if addr == "@" {
            let listener = TcpListener::bind(("0.0.0.0", port))?;
            let (sock, addr) = listener.accept()?;
            info!("Accept {}", addr);
            sock
        } else {
            info!("Connecting to {}", input);
            TcpStream::connect(input)?
        };

        Ok(Box::new(stream))
    } else {
        std::fs::File::open(input)
            .map(|i| Box::new(i) as _)
            .map_err(Into::into)
    }
}

/// Create a recording reader for given input and frame resolution.
pub fn create_reader(
    input: &str,
    width: usize,
    height: usize,
) -> Result<MvecReader<BufReader<Box<dyn Read + Send>>>> {
    let reader = BufReader::new(open_file(input)?);
    Ok(MvecReader::new(reader, width, height))
}

/// Sequential `.mvec` frame reader.
pub struct MvecReader<T> {
    reader: T,
    buf: Vec<u8>,
}

impl<T: Read> MvecReader<T> {
    pub fn new(reader: T, width: usize, height: usize) -> Self {
        let (rows, cols) = grid_dims(width, height);
        Self {
            reader,
            buf: vec![0; rows * cols * std::mem::size_of::<MotionVector>()],
        }
    }

    /// Size of a single frame in bytes.
    pub fn frame_len(&self) -> usize {
        self.buf.len()
    }

    /// Read the next frame.
    ///
    /// Returns `Ok(None)` at a clean end of stream. A frame cut short is an error.
    pub fn read_frame(&mut self) -> Result<Option<MotionVectorFrame>> {
        let mut filled = 0;

        while filled < self.buf.len() {
            match self.reader.read(&mut self.buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        match filled {
            0 => Ok(None),
            n if n == self.buf.len() => Ok(Some(MotionVectorFrame::from_bytes(&self.buf)?)),
            n => Err(std::io::Error::new(
                ErrorKind::UnexpectedEof,
                format!("partial frame of {} bytes, expected {}", n, self.buf.len()),
            )
            .into()),
        }
    }
}

impl<T: Read> Iterator for MvecReader<T> {
    type Item = Result<MotionVectorFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_frame().transpose()
    }
}

/// Append a frame to a recording.
pub fn write_frame(out: &mut impl Write, frame: &MotionVectorFrame) -> Result<()> {
    out.write_all(frame.as_bytes())?;
    Ok(())
}
