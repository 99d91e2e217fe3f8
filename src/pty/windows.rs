//! Windows ConPTY backend
//!
//! Wraps a pseudo-console: two pipes plus an `HPCON`. The console host owns
//! the far pipe ends; those are closed immediately after
//! `CreatePseudoConsole` succeeds. Process attachment lives in
//! `process::windows`, which borrows the `HPCON` during spawn.

use std::io;

use windows::Win32::Foundation::HANDLE;
use windows::Win32::Storage::FileSystem::{ReadFile, WriteFile};
use windows::Win32::System::Console::{
    ClosePseudoConsole, CreatePseudoConsole, ResizePseudoConsole, COORD, HPCON,
};
use windows::Win32::System::Pipes::{CreatePipe, PeekNamedPipe};

use super::{PtyError, Result};
use crate::handle::Handle;

fn win_err(e: windows::core::Error) -> io::Error {
    io::Error::from_raw_os_error(e.code().0)
}

pub struct PseudoTerminal {
    hpc: HPCON,
    /// Our write end of the console input pipe.
    input_write: Handle,
    /// Our read end of the console output pipe.
    output_read: Handle,
    columns: u16,
    rows: u16,
}

// The pseudo-console handles are only touched from the owning session.
unsafe impl Send for PseudoTerminal {}

impl PseudoTerminal {
    /// Allocate a pseudo-console sized to the given geometry.
    pub fn create(columns: u16, rows: u16) -> Result<Self> {
        unsafe {
            let mut input_read = HANDLE::default();
            let mut input_write = HANDLE::default();
            let mut output_read = HANDLE::default();
            let mut output_write = HANDLE::default();

            CreatePipe(&mut input_read, &mut input_write, None, 0)
                .map_err(|e| PtyError::Create(win_err(e)))?;
            let input_read = Handle::new(input_read);
            let input_write = Handle::new(input_write);

            if let Err(e) = CreatePipe(&mut output_read, &mut output_write, None, 0) {
                return Err(PtyError::Create(win_err(e)));
            }
            let output_read = Handle::new(output_read);
            let mut output_write = Handle::new(output_write);

            let size = COORD {
                X: columns as i16,
                Y: rows as i16,
            };
            let hpc = CreatePseudoConsole(size, input_read.raw(), output_write.raw(), 0)
                .map_err(|e| {
                    tracing::error!("CreatePseudoConsole failed: {}", e);
                    PtyError::Create(win_err(e))
                })?;

            // The console host duplicated these; close our copies now.
            drop(input_read);
            output_write.close();

            Ok(Self {
                hpc,
                input_write,
                output_read,
                columns,
                rows,
            })
        }
    }

    pub fn columns(&self) -> u16 {
        self.columns
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    /// Pseudo-console handle, borrowed by process spawn for the extended
    /// attribute list. Ownership stays here.
    pub(crate) fn pseudo_console(&self) -> HPCON {
        self.hpc
    }

    /// Full write to the console input pipe, retrying on partial writes.
    pub fn write(&self, mut bytes: &[u8]) -> Result<usize> {
        let total = bytes.len();
        while !bytes.is_empty() {
            let mut written: u32 = 0;
            unsafe {
                WriteFile(self.input_write.raw(), Some(bytes), Some(&mut written), None)
                    .map_err(|e| PtyError::Write(win_err(e)))?;
            }
            bytes = &bytes[written as usize..];
        }
        Ok(total)
    }

    /// Read from the console output pipe.
    ///
    /// With `block == false`, `PeekNamedPipe` decides readiness and `Ok(0)`
    /// means nothing pending. A broken pipe surfaces as [`PtyError::Eof`].
    pub fn read(&self, buf: &mut [u8], block: bool) -> Result<usize> {
        if !block {
            let mut available: u32 = 0;
            unsafe {
                if PeekNamedPipe(self.output_read.raw(), None, 0, None, Some(&mut available), None)
                    .is_err()
                {
                    return Err(PtyError::Eof);
                }
            }
            if available == 0 {
                return Ok(0);
            }
        }

        let mut read: u32 = 0;
        unsafe {
            if let Err(e) = ReadFile(self.output_read.raw(), Some(buf), Some(&mut read), None) {
                let err = win_err(e);
                return if err.kind() == io::ErrorKind::BrokenPipe {
                    Err(PtyError::Eof)
                } else {
                    Err(PtyError::Read(err))
                };
            }
        }
        if read == 0 {
            return Err(PtyError::Eof);
        }
        Ok(read as usize)
    }

    /// Resize the pseudo-console. Recorded geometry changes only on success.
    pub fn resize(&mut self, columns: u16, rows: u16) -> Result<()> {
        let size = COORD {
            X: columns as i16,
            Y: rows as i16,
        };
        unsafe {
            ResizePseudoConsole(self.hpc, size).map_err(|e| {
                tracing::warn!("ResizePseudoConsole failed: {}", e);
                PtyError::Resize(win_err(e))
            })?;
        }
        self.columns = columns;
        self.rows = rows;
        Ok(())
    }
}

impl Drop for PseudoTerminal {
    fn drop(&mut self) {
        unsafe {
            // Close the pseudo-console before its pipes.
            ClosePseudoConsole(self.hpc);
        }
    }
}
