// Copyright 2026 the fdbridge authors. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

use std::error;
use std::fmt;
use std::io::{Error as IOError, ErrorKind};

#[derive(Debug)]
pub enum Error {
    /// The endpoint could not be reached or the session could not be built.
    Connect(String),
    IOError(ErrorKind),
    /// A record arrived split into fragments, which this codec does not accept.
    Fragmented,
    RecordTooLarge(usize),
    /// A length-prefixed field exceeded the bound its decoder enforces.
    FieldTooLarge { len: usize, bound: usize },
    /// A union or enum field carried a tag outside its known set.
    BadTag { field: &'static str, tag: u32 },
    /// The reply's transaction id did not match the request's.
    XidMismatch { want: u32, got: u32 },
    /// The server answered with a non-success accept status.
    Rejected(u32),
    UnknownProcedure(u32),
    PathTooLong(usize),
    /// No free translation slot at or above the requested minimum.
    TableFull,
    /// The handle names a slot that is out of range or free.
    BadHandle(i32),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Connect(s) => write!(f, "connection error: {}", s),
            Error::IOError(kind) => write!(f, "IO error: {:?}", kind),
            Error::Fragmented => write!(f, "fragmented record"),
            Error::RecordTooLarge(len) => write!(f, "record of {} bytes exceeds the limit", len),
            Error::FieldTooLarge { len, bound } => {
                write!(f, "field of {} bytes exceeds its bound of {}", len, bound)
            }
            Error::BadTag { field, tag } => write!(f, "bad tag {} for {}", tag, field),
            Error::XidMismatch { want, got } => {
                write!(f, "transaction id mismatch: sent {} got {}", want, got)
            }
            Error::Rejected(status) => write!(f, "request rejected with status {}", status),
            Error::UnknownProcedure(num) => write!(f, "unknown procedure {}", num),
            Error::PathTooLong(len) => write!(f, "path of {} bytes exceeds the path bound", len),
            Error::TableFull => write!(f, "translation table full"),
            Error::BadHandle(handle) => write!(f, "invalid handle {}", handle),
        }
    }
}

impl From<IOError> for Error {
    fn from(e: IOError) -> Self {
        Error::IOError(e.kind())
    }
}

// This is important for other errors to wrap this one.
impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        None
    }
}

impl Error {
    /// The error indicator an instrumented caller should observe.
    ///
    /// Translation errors keep their platform meaning; everything
    /// transport-shaped collapses to the generic I/O indicator.
    pub fn errno(&self) -> i32 {
        match self {
            Error::BadHandle(_) => libc::EBADF,
            Error::TableFull => libc::EMFILE,
            Error::PathTooLong(_) => libc::ENAMETOOLONG,
            _ => libc::EIO,
        }
    }
}
