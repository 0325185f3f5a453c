use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("corpus root is not a directory: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("symbol {0:?} is not in the vocabulary")]
    UnknownSymbol(char),

    #[error("index {index} is out of range for a vocabulary of {size} symbols")]
    IndexOutOfRange { index: usize, size: usize },

    #[error("cannot decode {} at byte {offset}", path.display())]
    Decode { path: PathBuf, offset: usize },

    #[error("corpus yields no training examples")]
    EmptyCorpus,

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid distribution: {0}")]
    InvalidDistribution(String),

    #[error("array format error: {0}")]
    ArrayFormat(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Errors that come from a bad parameter or a broken caller contract rather
    /// than from the data itself.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_) | Error::InvalidDistribution(_))
    }
}
