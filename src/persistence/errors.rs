#![warn(missing_docs)]

use std::{fmt, path::PathBuf};

/// All the possible configuration and output-persistence errors.
#[derive(Debug)]
pub enum PersistenceError {
    /// Sent when unable to read a file, including the offending file path.
    ReadFileError(PathBuf),
    /// Sent when unable to write a file, including the offending file path.
    WriteFileError(PathBuf),
    /// Sent when unable to deserialise the TOML defaults file.
    DeserializeError(String),
    /// Sent when an unknown option is given.
    UnknownOptionError(String),
    /// Sent when an option's value cannot be parsed.
    BadValueError {
        /// The option.
        key: String,
        /// The rejected value.
        value: String,
    },
    /// Sent when an option that needs a value has none.
    MissingValueError(String),
    /// Sent when no input file or stream name was given.
    MissingInputError,
    /// Sent when no admission radius was given and none can be derived.
    MissingRadiusError,
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ReadFileError(path) => {
                write!(f, "ReadFileError: Failed to read file path {}", path.display())
            }
            Self::WriteFileError(path) => {
                write!(
                    f,
                    "WriteFileError: Failed to write file path {}",
                    path.display()
                )
            }
            Self::DeserializeError(string) => {
                write!(f, "DeserializeError: {}", string)
            }
            Self::UnknownOptionError(string) => {
                write!(
                    f,
                    "UnknownOptionError: Given option \"{}\" does not match any known values.",
                    string
                )
            }
            Self::BadValueError { key, value } => {
                write!(
                    f,
                    "BadValueError: \"{}\" is not a valid value for option \"{}\".",
                    value, key
                )
            }
            Self::MissingValueError(key) => {
                write!(f, "MissingValueError: Option \"{}\" requires a value.", key)
            }
            Self::MissingInputError => {
                write!(f, "MissingInputError: No input file or stream name given.")
            }
            Self::MissingRadiusError => {
                write!(
                    f,
                    "MissingRadiusError: No admission radius given (pass <rlim> or aK, or use -scandist)."
                )
            }
        }
    }
}
