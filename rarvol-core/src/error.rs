use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The stored name has a character that the single-byte name encoder cannot represent.
    #[error("cannot encode {ch:?} in file name {name:?} (only single-byte characters are supported)")]
    UnsupportedName { name: String, ch: char },
    #[error("read from data file failed: {0}")]
    SourceRead(#[source] io::Error),
    #[error("write to output failed: {0}")]
    SinkWrite(#[source] io::Error),
    /// An existing volume or SFV file does not have the expected layout.
    #[error("malformed input: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
