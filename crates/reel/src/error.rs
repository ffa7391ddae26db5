//! Error taxonomy for process pipelines.
//!
//! Closed streams and quota stops are not errors: they end a single stage's
//! streaming loop and are reported through [`StreamEnd`] instead.

use std::io;

/// Failures that escape a stage or a whole pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ReelError {
    /// The executable could not be spawned (missing, not executable, ...).
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    /// A pipeline was configured in a way that cannot run.
    #[error("configuration error: {0}")]
    Config(String),
    /// A numbered entry was requested that does not exist.
    #[error("no entry {index} (have {len})")]
    Index { index: usize, len: usize },
    /// Unexpected I/O failure on a process stream.
    #[error("i/o error on `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: io::Error,
    },
    /// Captured output was not valid UTF-8.
    #[error("output is not valid utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    /// A child task panicked.
    #[error("pipeline task panicked: {0}")]
    TaskPanicked(String),
    /// The owning scope was cancelled before the operation finished.
    #[error("cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ReelError>;

/// Why a stage stopped producing output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamEnd {
    /// The stage reported end-of-data.
    Eof,
    /// The byte limit was reached.
    Limit,
    /// The timeout elapsed.
    Timeout,
    /// The peer closed its end of the pipe (or the stage was closed).
    Closed,
}

impl StreamEnd {
    /// Quota stops are deliberate, successful terminations.
    pub fn is_quota(self) -> bool {
        matches!(self, StreamEnd::Limit | StreamEnd::Timeout)
    }
}

/// True for the error kinds that mean "the other side went away".
pub(crate) fn is_closed_pipe(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected
    )
}
