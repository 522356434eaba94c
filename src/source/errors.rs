#![warn(missing_docs)]

use std::{fmt, path::PathBuf};

/// All the possible frame-source errors.
#[derive(Debug)]
pub enum SourceError {
    /// Sent when an input file or directory cannot be opened.
    Open(PathBuf),
    /// Sent when reading from an already-open input fails.
    Read(PathBuf),
    /// Sent when a token on a text input line is not a number.
    Parse {
        /// Offending file.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// The token that failed to parse.
        token: String,
    },
    /// Sent when an image file cannot be decoded.
    Decode(PathBuf),
    /// Sent when a frame's dimension differs from the first frame's.
    Mismatch {
        /// Index of the offending frame.
        index: u64,
        /// Dimension established by the first frame.
        expected: usize,
        /// Dimension of the offending frame.
        got: usize,
    },
    /// Sent when the input contains no frames at all.
    Empty(PathBuf),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Open(path) => {
                write!(f, "OpenError: Failed to open input {}", path.display())
            }
            Self::Read(path) => {
                write!(f, "ReadError: Failed to read from {}", path.display())
            }
            Self::Parse { path, line, token } => {
                write!(
                    f,
                    "ParseError: \"{}\" at {}:{} is not a number",
                    token,
                    path.display(),
                    line
                )
            }
            Self::Decode(path) => {
                write!(f, "DecodeError: Failed to decode image {}", path.display())
            }
            Self::Mismatch {
                index,
                expected,
                got,
            } => {
                write!(
                    f,
                    "MismatchError: Frame {} has dimension {} but the stream started with {}",
                    index, got, expected
                )
            }
            Self::Empty(path) => {
                write!(f, "EmptyError: No frames found in {}", path.display())
            }
        }
    }
}
