//! POSIX pty backend
//!
//! Allocates a master/slave pair with `openpty`, gates non-blocking reads on
//! a zero-timeout `poll` of the master, and resizes with TIOCSWINSZ so the
//! child observes SIGWINCH.

use std::io;
use std::os::unix::io::{BorrowedFd, IntoRawFd, RawFd};

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};
use nix::pty::{openpty, Winsize};

use super::{PtyError, Result};
use crate::handle::Handle;

pub struct PseudoTerminal {
    master: Handle,
    slave: Handle,
    columns: u16,
    rows: u16,
}

fn winsize(columns: u16, rows: u16) -> Winsize {
    Winsize {
        ws_row: rows,
        ws_col: columns,
        ws_xpixel: 0,
        ws_ypixel: 0,
    }
}

impl PseudoTerminal {
    /// Allocate a pty pair sized to the given geometry.
    pub fn create(columns: u16, rows: u16) -> Result<Self> {
        let ws = winsize(columns, rows);
        let pair = openpty(Some(&ws), None).map_err(|e| {
            tracing::error!("openpty failed: {}", e);
            PtyError::Create(io::Error::from(e))
        })?;

        Ok(Self {
            master: Handle::new(pair.master.into_raw_fd()),
            slave: Handle::new(pair.slave.into_raw_fd()),
            columns,
            rows,
        })
    }

    pub fn columns(&self) -> u16 {
        self.columns
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    /// Master-side descriptor; borrowed only, never closed by callers.
    pub(crate) fn master_raw(&self) -> RawFd {
        self.master.raw()
    }

    /// Slave-side descriptor, borrowed by process spawn to attach the
    /// child's controlling terminal and stdio.
    pub(crate) fn slave_raw(&self) -> RawFd {
        self.slave.raw()
    }

    /// Full write to the master side, retrying on partial writes.
    pub fn write(&self, mut bytes: &[u8]) -> Result<usize> {
        let total = bytes.len();
        while !bytes.is_empty() {
            match nix::unistd::write(self.master.raw(), bytes) {
                Ok(n) => bytes = &bytes[n..],
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(PtyError::Write(io::Error::from(e))),
            }
        }
        Ok(total)
    }

    /// Read from the master side.
    ///
    /// With `block == false` the master is polled first and `Ok(0)` is
    /// returned when nothing is pending. A closed peer surfaces as
    /// [`PtyError::Eof`], never as `Ok(0)`.
    pub fn read(&self, buf: &mut [u8], block: bool) -> Result<usize> {
        if !block {
            let fd = unsafe { BorrowedFd::borrow_raw(self.master.raw()) };
            let mut fds = [PollFd::new(&fd, PollFlags::POLLIN)];
            match poll(&mut fds, 0) {
                Ok(0) => return Ok(0),
                Ok(_) => {
                    let revents = fds[0].revents().unwrap_or(PollFlags::empty());
                    if !revents.intersects(PollFlags::POLLIN | PollFlags::POLLHUP) {
                        return Ok(0);
                    }
                }
                Err(Errno::EINTR) => return Ok(0),
                Err(e) => return Err(PtyError::Read(io::Error::from(e))),
            }
        }

        loop {
            match nix::unistd::read(self.master.raw(), buf) {
                Ok(0) => return Err(PtyError::Eof),
                Ok(n) => return Ok(n),
                Err(Errno::EINTR) => continue,
                // The Linux pty master reports EIO once the slave side is
                // fully closed.
                Err(Errno::EIO) => return Err(PtyError::Eof),
                Err(e) => return Err(PtyError::Read(io::Error::from(e))),
            }
        }
    }

    /// Update the kernel-side window size. Recorded geometry changes only
    /// when the ioctl succeeds.
    pub fn resize(&mut self, columns: u16, rows: u16) -> Result<()> {
        let ws = winsize(columns, rows);
        let res = unsafe {
            libc::ioctl(
                self.master.raw(),
                libc::TIOCSWINSZ as libc::c_ulong,
                &ws as *const Winsize,
            )
        };
        if res < 0 {
            let err = io::Error::last_os_error();
            tracing::warn!("TIOCSWINSZ failed: {}", err);
            return Err(PtyError::Resize(err));
        }
        self.columns = columns;
        self.rows = rows;
        Ok(())
    }
}
