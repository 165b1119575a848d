use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("sink failure {0}")]
    Sink(#[from] std::io::Error),
    #[error("write buffer too small {0}")]
    BufferTooSmall(String),
}

/// Append-only byte sink the encoder flushes into. Provided per call; the
/// encoder never retains it.
pub trait OmWriteBackend {
    fn write(&mut self, bytes: &[u8]) -> std::io::Result<()>;
}

impl<W: std::io::Write> OmWriteBackend for W {
    fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.write_all(bytes)
    }
}

pub struct WriteBuffer {
    block: Vec<u8>,
    pos: usize,
    total_bytes_written: usize,
}

impl WriteBuffer {
    pub fn new(capacity: usize) -> Self {
        WriteBuffer {
            block: vec![0; capacity],
            pos: 0,
            total_bytes_written: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.block.len() - self.pos
    }

    pub fn total_bytes_written(&self) -> usize {
        self.total_bytes_written
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.remaining() {
            return Err(Error::BufferTooSmall(format!(
                "need {} bytes, {} available",
                bytes.len(),
                self.remaining()
            )));
        }
        self.block[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        self.total_bytes_written += bytes.len();
        Ok(())
    }

    pub fn push_i64<B: OmWriteBackend>(&mut self, value: i64, backend: &mut B) -> Result<()> {
        if self.remaining() < 8 {
            self.flush(backend)?;
        }
        LittleEndian::write_i64(&mut self.block[self.pos..self.pos + 8], value);
        self.pos += 8;
        self.total_bytes_written += 8;
        Ok(())
    }

    /// Unwritten tail of the staging buffer; pair with `advance` after
    /// filling a prefix of it.
    pub fn tail(&mut self) -> &mut [u8] {
        &mut self.block[self.pos..]
    }

    pub fn advance(&mut self, n_bytes: usize) {
        self.pos += n_bytes;
        self.total_bytes_written += n_bytes;
    }

    pub fn flush<B: OmWriteBackend>(&mut self, backend: &mut B) -> Result<()> {
        if self.pos > 0 {
            backend.write(&self.block[..self.pos])?;
            self.pos = 0;
        }
        Ok(())
    }
}
