//! POSIX process backend: fork/exec attached to a pty slave or stdio pipes.

use std::ffi::CString;
use std::io;
use std::os::unix::io::{IntoRawFd, RawFd};
use std::path::Path;

use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{chdir, dup2, execvp, fork, setsid, ForkResult, Pid};

use super::{Pipe, ProcessStatus, SpawnError};
use crate::handle::Handle;
use crate::pty::PseudoTerminal;

pub struct Process {
    pid: Pid,
    status: ProcessStatus,
    exit_code: i32,
    leave_running: bool,
}

fn cstring(s: &str) -> Result<CString, SpawnError> {
    CString::new(s).map_err(|_| SpawnError::BadArgument(s.to_string()))
}

/// Build the argv vector: program first, then its arguments.
fn build_argv(program: &str, args: &[String]) -> Result<Vec<CString>, SpawnError> {
    let mut argv = Vec::with_capacity(args.len() + 1);
    argv.push(cstring(program)?);
    for arg in args {
        argv.push(cstring(arg)?);
    }
    Ok(argv)
}

/// Runs in the child after fork. Only returns on failure.
fn child_exec(argv: &[CString], working_directory: &str) -> ! {
    if !working_directory.is_empty() {
        let _ = chdir(Path::new(working_directory));
    }
    std::env::set_var("TERM", "xterm-256color");
    let _ = execvp(&argv[0], argv);
    unsafe { libc::_exit(127) }
}

impl Process {
    fn new(pid: Pid) -> Self {
        Self {
            pid,
            status: ProcessStatus::Running,
            exit_code: 1,
            leave_running: false,
        }
    }

    pub fn pid(&self) -> i32 {
        self.pid.as_raw()
    }

    /// Fork and exec with the pty slave as the child's controlling terminal
    /// and stdio. The pty is borrowed; the parent never loses ownership.
    pub(crate) fn spawn_with_pty(
        program: &str,
        args: &[String],
        working_directory: &str,
        pty: &PseudoTerminal,
    ) -> Result<Self, SpawnError> {
        let argv = build_argv(program, args)?;
        let master = pty.master_raw();
        let slave = pty.slave_raw();

        match unsafe { fork() }.map_err(|e| SpawnError::Os(io::Error::from(e)))? {
            ForkResult::Parent { child } => {
                tracing::debug!("spawned {} as pid {}", program, child);
                Ok(Self::new(child))
            }
            ForkResult::Child => {
                if setsid().is_err() {
                    unsafe { libc::_exit(1) }
                }
                // Attach the slave as the controlling terminal.
                unsafe {
                    if libc::ioctl(slave, libc::TIOCSCTTY as libc::c_ulong, 0) < 0 {
                        libc::_exit(1);
                    }
                }
                if dup2(slave, libc::STDIN_FILENO).is_err()
                    || dup2(slave, libc::STDOUT_FILENO).is_err()
                    || dup2(slave, libc::STDERR_FILENO).is_err()
                {
                    unsafe { libc::_exit(1) }
                }
                let _ = nix::unistd::close(master);
                if slave > libc::STDERR_FILENO {
                    let _ = nix::unistd::close(slave);
                }
                child_exec(&argv, working_directory)
            }
        }
    }

    /// Fork and exec with plain pipes on stdio.
    pub(crate) fn spawn_with_pipe(
        program: &str,
        args: &[String],
        working_directory: &str,
        with_stderr: bool,
    ) -> Result<(Self, Pipe), SpawnError> {
        let argv = build_argv(program, args)?;

        let (stdin_read, stdin_write) =
            nix::unistd::pipe().map_err(|e| SpawnError::Os(io::Error::from(e)))?;
        let (stdout_read, stdout_write) =
            nix::unistd::pipe().map_err(|e| SpawnError::Os(io::Error::from(e)))?;

        let stdin_read = Handle::new(stdin_read.into_raw_fd());
        let stdin_write = Handle::new(stdin_write.into_raw_fd());
        let stdout_read = Handle::new(stdout_read.into_raw_fd());
        let stdout_write = Handle::new(stdout_write.into_raw_fd());

        match unsafe { fork() }.map_err(|e| SpawnError::Os(io::Error::from(e)))? {
            ForkResult::Parent { child } => {
                // Child-side ends close here; ours move into the Pipe.
                drop(stdin_read);
                drop(stdout_write);
                Ok((
                    Self::new(child),
                    Pipe {
                        output: stdout_read,
                        input: stdin_write,
                    },
                ))
            }
            ForkResult::Child => {
                fn wire(from: RawFd, to: RawFd) {
                    if dup2(from, to).is_err() {
                        unsafe { libc::_exit(1) }
                    }
                }
                wire(stdin_read.raw(), libc::STDIN_FILENO);
                wire(stdout_write.raw(), libc::STDOUT_FILENO);
                if with_stderr {
                    wire(stdout_write.raw(), libc::STDERR_FILENO);
                }
                drop(stdin_read);
                drop(stdin_write);
                drop(stdout_read);
                drop(stdout_write);
                child_exec(&argv, working_directory)
            }
        }
    }

    /// Non-blocking exit poll. A `waitpid` error is treated as still
    /// running; only a successful reap transitions the status.
    pub fn check_exit_status(&mut self) {
        if self.status == ProcessStatus::Exited {
            return;
        }
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => {}
            Ok(WaitStatus::Exited(_, code)) => {
                self.status = ProcessStatus::Exited;
                self.exit_code = code;
            }
            Ok(WaitStatus::Signaled(_, sig, _)) => {
                self.status = ProcessStatus::Exited;
                self.exit_code = 128 + sig as i32;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("waitpid({}) failed: {}", self.pid, e);
            }
        }
    }

    /// Block until the child exits.
    pub fn wait_for_exit(&mut self) {
        if self.status == ProcessStatus::Exited {
            return;
        }
        match waitpid(self.pid, None) {
            Ok(WaitStatus::Exited(_, code)) => {
                self.status = ProcessStatus::Exited;
                self.exit_code = code;
            }
            Ok(WaitStatus::Signaled(_, sig, _)) => {
                self.status = ProcessStatus::Exited;
                self.exit_code = 128 + sig as i32;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("waitpid({}) failed: {}", self.pid, e);
            }
        }
    }

    /// Forcibly end the child. Idempotent: once `Exited`, a no-op. Records
    /// a synthetic failure exit code.
    pub fn terminate(&mut self) {
        if self.status == ProcessStatus::Exited {
            return;
        }
        let _ = kill(self.pid, Signal::SIGHUP);
        // Best-effort reap so no zombie lingers for the process lifetime.
        let _ = waitpid(self.pid, Some(WaitPidFlag::WNOHANG));
        self.exit_code = 1;
        self.status = ProcessStatus::Exited;
    }

    pub fn has_exited(&self) -> bool {
        self.status == ProcessStatus::Exited
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.status {
            ProcessStatus::Exited => Some(self.exit_code),
            ProcessStatus::Running => None,
        }
    }

    /// Let the child outlive this handle: drop will no longer terminate it.
    pub fn leave_running(&mut self) {
        self.leave_running = true;
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        if !self.leave_running {
            self.terminate();
        }
    }
}
