use std::fmt;
use std::io;

#[derive(Debug)]
pub enum StoreError {
    /// The journal could not durably record the event.
    Io(String),
    /// The background WAL writer has shut down.
    WriterGone,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(msg) => write!(f, "journal error: {msg}"),
            StoreError::WriterGone => write!(f, "journal writer shut down"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}
