/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// No `:` start-of-frame character in the input.
    #[error("frame doesn't contain start character")]
    NoStartChar,

    /// Input ends before the header is complete.
    #[error("frame too short, does not contain a full length header")]
    TooShort,

    /// Input ends before a checksum could be present.
    #[error("frame too short, does not contain a CRC")]
    NoCrc,

    /// Declared byte count needs more characters than were received.
    #[error("frame too short, mismatch with data count specified")]
    SizeMismatch,

    /// The serial contains the broadcast marker, which only masters send.
    #[error("frame serial contains ! which is only issued by masters")]
    InvalidChar,

    /// The frame was sent by a master (our own echo, or a read request).
    #[error("frame is from a master, don't process")]
    FromMaster,

    /// The received checksum doesn't match the computed one.
    #[error("frame checksum failed - rx: 0x{received:04X}, calc: 0x{calculated:04X}")]
    ChecksumMismatch { received: u16, calculated: u16 },

    /// A field that must be hex isn't.
    #[error("invalid hex field {0:?}")]
    InvalidHex(String),

    /// No end-of-frame byte within the maximum frame size.
    #[error("frame exceeds {max} bytes without an end-of-frame byte")]
    FrameTooLong { max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The line was closed before a complete frame was received or written.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

impl FrameError {
    /// Decode outcomes that are expected traffic rather than faults.
    pub fn is_benign(&self) -> bool {
        matches!(self, FrameError::FromMaster)
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
