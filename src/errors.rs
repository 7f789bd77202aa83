//
// Errors
//
use std::io;
use std::result;
use std::error;
use std::num;
use std::string;
use std::fmt;
use regex;

/// Type alias for depctx errors
pub type Result<X> = result::Result<X, Error>;

/// Wrapper for many kinds of errors occuring while reading the corpus and counting contexts
#[derive(Debug)]
pub enum Error {
    IOError(io::Error),
    ParseIntError(num::ParseIntError),
    Regex(regex::Error),
    Utf8(string::FromUtf8Error),
    MissingFile(&'static str, Option<io::Error>),
    Store(String),
    BadSnapshot(String),
    Parser(String),
    BatchMismatch { batch: usize, expected: usize, found: usize },
    Other(String),
}

impl Error {
    /// Whether the dispatcher may drop the batch that raised this and keep going.
    ///
    /// Only a parser returning the wrong number of sentences qualifies. Everything else
    /// stops the run.
    pub fn is_droppable(&self) -> bool {
        match *self {
            Error::BatchMismatch { .. } => true,
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::IOError(ref err) => write!(f, "IO error: {}", err),
            Error::ParseIntError(ref err) => write!(f, "Error parsing integer: {}", err),
            Error::Regex(ref err) => write!(f, "Bad pattern: {}", err),
            Error::Utf8(ref err) => write!(f, "Invalid UTF-8: {}", err),
            Error::MissingFile(ref info, ref opt_err) => {
                write!(f,
                    "The {} must already exist at this point but there was a problem opening it. \
                    Wrong directory? Maybe missed a step? The OS error was: ",
                    info)?;
                if let Some(ref err) = *opt_err { err.fmt(f) }
                else { write!(f, "Unknown") }
            },
            Error::Store(ref info) => write!(f, "Corpus store error: {}", info),
            Error::BadSnapshot(ref info) => write!(f, "Unreadable vocabulary snapshot: {}", info),
            Error::Parser(ref info) => write!(f, "Dependency parser failed: {}", info),
            Error::BatchMismatch { batch, expected, found } => write!(f,
                "Batch {} sent {} sentences to the parser but got {} back", batch, expected, found),
            Error::Other(ref info) => write!(f, "{}", info),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::IOError(ref err) => Some(err),
            Error::ParseIntError(ref err) => Some(err),
            Error::Regex(ref err) => Some(err),
            Error::Utf8(ref err) => Some(err),
            Error::MissingFile(_, Some(ref err)) => Some(err),
            _ => None,
        }
    }
}
//
// Convert everything else into Error
//
impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IOError(err)
    }
}
impl From<num::ParseIntError> for Error {
    fn from(err: num::ParseIntError) -> Self {
        Error::ParseIntError(err)
    }
}
impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::Regex(err)
    }
}
impl From<string::FromUtf8Error> for Error {
    fn from(err: string::FromUtf8Error) -> Self {
        Error::Utf8(err)
    }
}

//
// Convert Error into a general io Error
//
impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::IOError(err) => err,
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_mismatches_are_droppable() {
        assert!(Error::BatchMismatch { batch: 3, expected: 10, found: 9 }.is_droppable());
        assert!(!Error::Store("gone".into()).is_droppable());
        assert!(!Error::Parser("exit status 1".into()).is_droppable());
    }

    #[test]
    fn missing_file_mentions_what_is_missing() {
        let msg = Error::MissingFile("word vocabulary", None).to_string();
        assert!(msg.contains("word vocabulary"));
        assert!(msg.ends_with("Unknown"));
    }
}
