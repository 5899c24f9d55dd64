use std::io::{ErrorKind, Write};

use crate::codec::{encode_frame, Frame};
use crate::error::{FrameError, Result};

/// Writes complete frames to any `Write` stream.
pub struct FrameWriter<T> {
    inner: T,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Write a complete frame, preamble and delimiter included (blocking).
    ///
    /// Returns the number of bytes put on the line. A stream that accepts
    /// zero bytes yields `Err(FrameError::ConnectionClosed)`.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<usize> {
        let wire = frame.to_wire_bytes();

        let mut offset = 0usize;
        while offset < wire.len() {
            match self.inner.write(&wire[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()?;
        Ok(offset)
    }

    /// Encode and send a frame.
    pub fn send(
        &mut self,
        address: char,
        serial: &str,
        command: &str,
        payload: &str,
    ) -> Result<Frame> {
        let frame = encode_frame(address, serial, command, payload);
        self.write_frame(&frame)?;
        Ok(frame)
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::codec::decode_frame;
    use crate::command::{MASTER, PING, PROBE};

    #[test]
    fn write_single_frame() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));

        let frame = writer.send(MASTER, "ASL1805180001", PING, "23").unwrap();

        let wire = writer.into_inner().into_inner();
        assert_eq!(wire, b"UU:!ASL1805180001$0010023043E\x04".to_vec());
        assert_eq!(wire.len(), frame.wire_size());
    }

    #[test]
    fn written_probe_frame_decodes() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        let sent = encode_frame(PROBE, "ASL1805180009", PING, "");
        let n = writer.write_frame(&sent).unwrap();

        let wire = writer.into_inner().into_inner();
        assert_eq!(n, wire.len());
        let got = decode_frame(&wire).unwrap();
        assert_eq!(got.serial, "ASL1805180009");
    }

    #[test]
    fn zero_byte_write_is_connection_closed() {
        let mut writer = FrameWriter::new(ZeroWriter);
        let err = writer.send(MASTER, "ASL1805180001", PING, "").unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn short_writes_are_completed() {
        let mut writer = FrameWriter::new(ShortWriter::default());
        let frame = writer.send(MASTER, "ASL1805180001", PING, "23").unwrap();
        assert_eq!(writer.get_ref().bytes, frame.to_wire_bytes());
    }

    #[test]
    fn write_error_propagates() {
        let mut writer = FrameWriter::new(FailingWriter);
        let err = writer.send(MASTER, "ASL1805180001", PING, "").unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
    }

    #[test]
    fn flush_propagates() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = FrameWriter::new(sink);

        writer.send(MASTER, "ASL1805180001", PING, "").unwrap();
        assert!(flag.load(Ordering::SeqCst));
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::BrokenPipe))
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct ShortWriter {
        bytes: Vec<u8>,
    }

    impl Write for ShortWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let n = buf.len().min(5);
            self.bytes.extend_from_slice(&buf[..n]);
            Ok(n)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }
}
