//! Error types for bzkit operations.
//!
//! Every failure the codec can report is a [`BzError`]. Variants fall into
//! the classes returned by [`BzError::kind`]: malformed streams, data
//! integrity failures, usage errors, parallel worker failures and plain I/O.
//! The distinction between malformed and corrupted input matters to callers
//! that apply different retry or alerting policies.

use std::io;
use thiserror::Error;

/// The main error type for bzkit operations.
#[derive(Debug, Error)]
pub enum BzError {
    /// I/O error from underlying reader/writer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid magic number in a stream, block or trailer header.
    #[error("Invalid magic number: expected {expected:02x?}, found {found:02x?}")]
    InvalidMagic {
        /// Expected magic bytes.
        expected: Vec<u8>,
        /// Actual magic bytes found.
        found: Vec<u8>,
    },

    /// Invalid header format.
    #[error("Invalid header: {message}")]
    InvalidHeader {
        /// Description of the header error.
        message: String,
    },

    /// Block size digit in the stream header is outside `'1'..='9'`.
    #[error("Unsupported block size digit: {digit:#04x}")]
    UnsupportedBlockSize {
        /// The raw header byte.
        digit: u8,
    },

    /// Input ended in the middle of a field.
    #[error("Unexpected end of stream at bit position {bit_position}")]
    UnexpectedEof {
        /// Number of bits consumed before the input ran out.
        bit_position: u64,
    },

    /// Corrupted data in a block body.
    #[error("Corrupted data at offset {offset}: {message}")]
    CorruptedData {
        /// Byte offset where corruption was detected.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// Invalid Huffman code encountered during decompression.
    #[error("Invalid Huffman code at bit position {bit_position}")]
    InvalidHuffmanCode {
        /// Bit position where the invalid code was found.
        bit_position: u64,
    },

    /// Stored block CRC does not match the decoded bytes.
    #[error("Block {block} CRC mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    BlockCrcMismatch {
        /// Ordinal of the failing block, starting at 1.
        block: u64,
        /// CRC stored in the block header.
        expected: u32,
        /// CRC of the decoded bytes.
        computed: u32,
    },

    /// Combined CRC in the trailer does not match the decoded blocks.
    #[error("Stream CRC mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    StreamCrcMismatch {
        /// CRC stored in the trailer.
        expected: u32,
        /// Combined CRC of all decoded blocks.
        computed: u32,
    },

    /// Block size argument outside `1..=9`.
    #[error("Invalid block size {value}: must be between 1 and 9")]
    InvalidBlockSize {
        /// The rejected value.
        value: u8,
    },

    /// Write attempted after the stream was closed.
    #[error("Stream already closed")]
    StreamClosed,

    /// Invalid argument passed to a constructor or operation.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// A parallel compression worker failed.
    #[error("Worker for block {ordinal} failed: {message}")]
    WorkerFailed {
        /// Ordinal of the block the worker was compressing.
        ordinal: u64,
        /// Description of the failure.
        message: String,
    },

    /// The stream failed earlier and refuses further operations.
    #[error("Stream is poisoned by an earlier {kind:?} failure")]
    Poisoned {
        /// Class of the failure that poisoned the stream.
        kind: ErrorKind,
    },
}

/// Result type alias for bzkit operations.
pub type Result<T> = std::result::Result<T, BzError>;

/// Broad classification of a [`BzError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The framing or structure of the stream is invalid.
    MalformedStream,
    /// Framing was valid but a checksum did not match.
    DataIntegrity,
    /// The API was used incorrectly.
    Usage,
    /// A parallel worker failed.
    WorkerFailure,
    /// The underlying reader or writer failed.
    Io,
}

impl BzError {
    /// Create an invalid magic error.
    pub fn invalid_magic(expected: impl Into<Vec<u8>>, found: impl Into<Vec<u8>>) -> Self {
        Self::InvalidMagic {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create an invalid header error.
    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self::InvalidHeader {
            message: message.into(),
        }
    }

    /// Create an unexpected EOF error.
    pub fn unexpected_eof(bit_position: u64) -> Self {
        Self::UnexpectedEof { bit_position }
    }

    /// Create a corrupted data error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::CorruptedData {
            offset,
            message: message.into(),
        }
    }

    /// Create an invalid Huffman code error.
    pub fn invalid_huffman(bit_position: u64) -> Self {
        Self::InvalidHuffmanCode { bit_position }
    }

    /// Create a block CRC mismatch error.
    pub fn block_crc_mismatch(block: u64, expected: u32, computed: u32) -> Self {
        Self::BlockCrcMismatch {
            block,
            expected,
            computed,
        }
    }

    /// Create a stream CRC mismatch error.
    pub fn stream_crc_mismatch(expected: u32, computed: u32) -> Self {
        Self::StreamCrcMismatch { expected, computed }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a worker failure error.
    pub fn worker_failed(ordinal: u64, message: impl Into<String>) -> Self {
        Self::WorkerFailed {
            ordinal,
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Io,
            Self::InvalidMagic { .. }
            | Self::InvalidHeader { .. }
            | Self::UnsupportedBlockSize { .. }
            | Self::UnexpectedEof { .. }
            | Self::CorruptedData { .. }
            | Self::InvalidHuffmanCode { .. } => ErrorKind::MalformedStream,
            Self::BlockCrcMismatch { .. } | Self::StreamCrcMismatch { .. } => {
                ErrorKind::DataIntegrity
            }
            Self::InvalidBlockSize { .. } | Self::StreamClosed | Self::InvalidArgument { .. } => {
                ErrorKind::Usage
            }
            Self::WorkerFailed { .. } => ErrorKind::WorkerFailure,
            Self::Poisoned { kind } => *kind,
        }
    }

    /// Returns true for checksum failures.
    pub fn is_data_integrity(&self) -> bool {
        self.kind() == ErrorKind::DataIntegrity
    }

    /// Recover a `BzError` that was converted into an [`io::Error`].
    ///
    /// Errors that did not originate in this crate come back as [`BzError::Io`].
    pub fn from_io(err: io::Error) -> Self {
        if !err.get_ref().is_some_and(|inner| inner.is::<BzError>()) {
            return Self::Io(err);
        }
        match err.into_inner().map(|inner| inner.downcast::<BzError>()) {
            Some(Ok(bz)) => *bz,
            _ => Self::Poisoned {
                kind: ErrorKind::Io,
            },
        }
    }
}

impl From<BzError> for io::Error {
    fn from(err: BzError) -> Self {
        let kind = match &err {
            BzError::Io(inner) => inner.kind(),
            BzError::UnexpectedEof { .. } => io::ErrorKind::UnexpectedEof,
            other => match other.kind() {
                ErrorKind::MalformedStream | ErrorKind::DataIntegrity => {
                    io::ErrorKind::InvalidData
                }
                ErrorKind::Usage => io::ErrorKind::InvalidInput,
                ErrorKind::WorkerFailure | ErrorKind::Io => io::ErrorKind::Other,
            },
        };
        io::Error::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BzError::invalid_magic(b"BZh".to_vec(), b"PK\x03".to_vec());
        assert!(err.to_string().contains("Invalid magic"));

        let err = BzError::block_crc_mismatch(3, 0x12345678, 0xDEADBEEF);
        assert!(err.to_string().contains("Block 3"));
        assert!(err.to_string().contains("0xdeadbeef"));

        let err = BzError::worker_failed(7, "boom");
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            BzError::corrupted(0, "bad").kind(),
            ErrorKind::MalformedStream
        );
        assert_eq!(
            BzError::UnsupportedBlockSize { digit: b'0' }.kind(),
            ErrorKind::MalformedStream
        );
        assert!(BzError::stream_crc_mismatch(1, 2).is_data_integrity());
        assert!(!BzError::unexpected_eof(12).is_data_integrity());
        assert_eq!(BzError::StreamClosed.kind(), ErrorKind::Usage);
        assert_eq!(
            BzError::invalid_argument("too many bits").kind(),
            ErrorKind::Usage
        );
        assert_eq!(
            BzError::invalid_header("origPtr").kind(),
            ErrorKind::MalformedStream
        );
        assert_eq!(
            BzError::InvalidBlockSize { value: 0 }.kind(),
            ErrorKind::Usage
        );
        assert_eq!(
            BzError::Poisoned {
                kind: ErrorKind::WorkerFailure
            }
            .kind(),
            ErrorKind::WorkerFailure
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: BzError = io_err.into();
        assert!(matches!(err, BzError::Io(_)));
    }

    #[test]
    fn test_into_io_error_roundtrip() {
        let io_err: io::Error = BzError::block_crc_mismatch(1, 2, 3).into();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidData);

        let back = BzError::from_io(io_err);
        assert!(matches!(
            back,
            BzError::BlockCrcMismatch {
                block: 1,
                expected: 2,
                computed: 3
            }
        ));
    }

    #[test]
    fn test_into_io_error_kinds() {
        let err: io::Error = BzError::unexpected_eof(8).into();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let err: io::Error = BzError::StreamClosed.into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        let plain = io::Error::new(io::ErrorKind::BrokenPipe, "pipe");
        assert!(matches!(BzError::from_io(plain), BzError::Io(_)));
    }
}
