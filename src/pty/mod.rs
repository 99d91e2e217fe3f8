//! Pseudo-terminal allocation and byte I/O
//!
//! One [`PseudoTerminal`] owns a platform pty pair: master + slave file
//! descriptors on unix, input/output pipe handles plus a pseudo-console on
//! windows. Callers get the same surface on both platforms: `create`,
//! `read` (optionally blocking), retrying full `write`, and `resize`.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PtyError {
    #[error("Failed to allocate pseudo-terminal: {0}")]
    Create(#[source] io::Error),

    #[error("Failed to read from PTY: {0}")]
    Read(#[source] io::Error),

    #[error("Failed to write to PTY: {0}")]
    Write(#[source] io::Error),

    #[error("Failed to resize PTY: {0}")]
    Resize(#[source] io::Error),

    /// The peer (child) side closed. Distinct from `read` returning
    /// `Ok(0)`, which means no data is currently pending.
    #[error("PTY peer closed")]
    Eof,
}

pub type Result<T> = std::result::Result<T, PtyError>;

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::PseudoTerminal;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::PseudoTerminal;
