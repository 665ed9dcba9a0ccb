use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::common::io_error_msg;

/// sysexits(3) values used as process exit codes.
pub mod exit_code {
    pub const OK: i32 = 0;
    pub const USAGE: i32 = 64;
    pub const DATAERR: i32 = 65;
    pub const NOINPUT: i32 = 66;
    pub const UNAVAILABLE: i32 = 69;
    pub const CANTCREAT: i32 = 73;
    pub const IOERR: i32 = 74;
}

pub type Result<T> = std::result::Result<T, Error>;

/// Every failure is terminal for the whole run; there is no per-worker
/// recovery. Each variant maps to one distinct exit status.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Usage(String),

    #[error("invalid thread count: '{0}'")]
    InvalidThreadCount(String),

    #[error("cannot open {}: {}", .path.display(), io_error_msg(.source))]
    NoInput { path: PathBuf, source: io::Error },

    #[error("cannot allocate {what} ({bytes} bytes)")]
    Alloc { what: &'static str, bytes: usize },

    #[error("cannot start worker threads: {0}")]
    ThreadPool(String),

    #[error("cannot pipe output: {command} > {target}: {}", io_error_msg(.source))]
    Spawn {
        command: String,
        target: String,
        source: io::Error,
    },

    #[error("{context}: {}", io_error_msg(.source))]
    Io {
        context: String,
        source: io::Error,
    },
}

impl Error {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Usage(_) => exit_code::USAGE,
            Error::InvalidThreadCount(_) => exit_code::DATAERR,
            Error::NoInput { .. } => exit_code::NOINPUT,
            Error::Alloc { .. } | Error::ThreadPool(_) => exit_code::UNAVAILABLE,
            Error::Spawn { .. } => exit_code::CANTCREAT,
            Error::Io { .. } => exit_code::IOERR,
        }
    }
}
