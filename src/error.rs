use std::{fmt, io};

/// Errors produced by tickers, periodic tasks and the printer.
#[derive(Debug)]
pub enum Error {
    /// A ticker was asked to tick with a zero-length period.
    ZeroPeriod,

    /// Writing to the output failed, or the timer thread pool could not be created.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ZeroPeriod => write!(f, "Ticker period must be greater than zero"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::ZeroPeriod => None,
            Error::Io(e) => Some(e),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
