use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use crate::codec::{decode_frame, Frame};
use crate::command::EOF;
use crate::error::{FrameError, Result};

/// Longest run of bytes accepted without an end-of-frame byte.
pub const MAX_FRAME_SIZE: usize = 10 * 1024;

const READ_CHUNK_SIZE: usize = 256;

/// Frame reader configuration.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Maximum bytes buffered while waiting for an end-of-frame byte.
    pub max_frame_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

/// Reads end-of-frame delimited frames from any `Read` stream.
///
/// Bytes following a delimiter stay buffered for the next call. After an
/// error the caller should [`reset`](FrameReader::reset) to drop any partial
/// frame before reading again.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: ReaderConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, ReaderConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: ReaderConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_CHUNK_SIZE),
            config,
        }
    }

    /// Read up to and including the next end-of-frame byte (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_raw(&mut self) -> Result<Bytes> {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == EOF) {
                return Ok(self.buf.split_to(pos + 1).freeze());
            }

            if self.buf.len() >= self.config.max_frame_size {
                warn!(
                    buffered = self.buf.len(),
                    max = self.config.max_frame_size,
                    "no end-of-frame byte, discarding buffer"
                );
                self.buf.clear();
                return Err(FrameError::FrameTooLong {
                    max: self.config.max_frame_size,
                });
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Read and decode the next frame.
    pub fn read_frame(&mut self) -> Result<Frame> {
        let raw = self.read_raw()?;
        decode_frame(&raw)
    }

    /// Drop any partially received frame.
    pub fn reset(&mut self) {
        if !self.buf.is_empty() {
            debug!(bytes = self.buf.len(), "partial frame dropped");
        }
        self.buf.clear();
    }

    /// Number of bytes buffered but not yet returned.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }
}
