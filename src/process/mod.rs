//! Child process lifecycle and spawning
//!
//! A [`Process`] tracks one spawned child: `Running` until a successful
//! status poll or wait observes the exit, then `Exited` forever. Spawning is
//! polymorphic over [`ProcessFactory`]; the [`HostProcessFactory`] performs
//! direct OS process creation. Alternative strategies (container launchers,
//! remote shells) implement the same trait elsewhere by rewriting
//! program/args before delegating to a host factory.

use std::io;
use thiserror::Error;

use crate::handle::Handle;
use crate::pty::{PseudoTerminal, PtyError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    Exited,
}

/// Stdio endpoints of a child spawned with [`ProcessFactory::create_with_stdio_pipe`]:
/// our read end of the child's stdout (plus stderr when requested) and our
/// write end of the child's stdin.
pub struct Pipe {
    pub output: Handle,
    pub input: Handle,
}

#[derive(Error, Debug)]
pub enum SpawnError {
    #[error(transparent)]
    Pty(#[from] PtyError),

    #[error("Invalid program or argument: {0}")]
    BadArgument(String),

    #[error("Failed to spawn process: {0}")]
    Os(#[source] io::Error),
}

/// Spawning capability set. Implementations must not leak partially-created
/// resources on failure and must be safe to call repeatedly.
pub trait ProcessFactory {
    /// Spawn `program` attached to a freshly allocated pseudo-terminal of
    /// the given geometry.
    fn create_with_pseudo_terminal(
        &self,
        program: &str,
        args: &[String],
        working_directory: &str,
        columns: u16,
        rows: u16,
    ) -> Result<(Process, PseudoTerminal), SpawnError>;

    /// Spawn `program` with plain stdio pipes, folding stderr into the
    /// output pipe when `with_stderr` is set.
    fn create_with_stdio_pipe(
        &self,
        program: &str,
        args: &[String],
        working_directory: &str,
        with_stderr: bool,
    ) -> Result<(Process, Pipe), SpawnError>;
}

/// Direct OS process creation: fork/exec with the pty slave as controlling
/// terminal on unix, `CreateProcessW` with a pseudo-console attribute list
/// on windows.
#[derive(Default)]
pub struct HostProcessFactory;

impl ProcessFactory for HostProcessFactory {
    fn create_with_pseudo_terminal(
        &self,
        program: &str,
        args: &[String],
        working_directory: &str,
        columns: u16,
        rows: u16,
    ) -> Result<(Process, PseudoTerminal), SpawnError> {
        let pty = PseudoTerminal::create(columns, rows)?;
        // On spawn failure the pty is dropped here, releasing both sides.
        let process = Process::spawn_with_pty(program, args, working_directory, &pty)?;
        Ok((process, pty))
    }

    fn create_with_stdio_pipe(
        &self,
        program: &str,
        args: &[String],
        working_directory: &str,
        with_stderr: bool,
    ) -> Result<(Process, Pipe), SpawnError> {
        Process::spawn_with_pipe(program, args, working_directory, with_stderr)
    }
}

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::Process;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::Process;
