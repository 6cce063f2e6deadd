use std::path::PathBuf;

use thiserror::Error;

/// The outcome of an external process launched by an `exec` action, as
/// observed via `waitpid(2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    Exited(i32),
    Signaled(i32),
}

/// Every error this crate can produce, grouped along the kinds described
/// in four kinds: configuration/programming, I/O, subprocess, and parse.
///
/// Allocation failure is deliberately not modeled: the Rust global
/// allocator aborts the process on exhaustion, so there is nothing for this
/// type to represent.
#[derive(Debug, Error)]
pub enum MdsortError {
    /// Configuration/programming errors: invalid back-reference, unknown
    /// macro, invalid flag character, malformed Maildir path, buffer
    /// (path) too long.
    #[error("{0}")]
    Config(String),

    /// I/O errors not tied to a specific path (e.g. fsync, fstatat on an
    /// already-resolved descriptor).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// I/O errors tied to a specific path, for error messages that need to
    /// name the file involved.
    #[error("{path}: {source}")]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Errors while parsing message structure (MIME boundary, nesting
    /// depth).
    #[error("{0}")]
    Parse(String),

    /// A subprocess launched by an `exec` action exited non-zero or was
    /// terminated by a signal.
    #[error("{argv0}: {outcome:?}")]
    Subprocess { argv0: String, outcome: ExecOutcome },
}

pub type Result<T> = std::result::Result<T, MdsortError>;

impl MdsortError {
    pub fn config(msg: impl Into<String>) -> Self {
        MdsortError::Config(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        MdsortError::Parse(msg.into())
    }

    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MdsortError::IoAt {
            path: path.into(),
            source,
        }
    }
}
