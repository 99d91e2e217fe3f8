//! Windows process backend: `CreateProcessW` with a pseudo-console bound
//! through an extended attribute list, or plain inheritable pipes.

use std::io;

use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Foundation::{HANDLE, HANDLE_FLAG_INHERIT, STILL_ACTIVE};
use windows::Win32::Foundation::SetHandleInformation;
use windows::Win32::Security::SECURITY_ATTRIBUTES;
use windows::Win32::System::Console::HPCON;
use windows::Win32::System::Pipes::CreatePipe;
use windows::Win32::System::Threading::{
    CreateProcessW, DeleteProcThreadAttributeList, GetExitCodeProcess,
    InitializeProcThreadAttributeList, TerminateProcess, UpdateProcThreadAttribute,
    WaitForSingleObject, EXTENDED_STARTUPINFO_PRESENT, INFINITE, LPPROC_THREAD_ATTRIBUTE_LIST,
    PROCESS_INFORMATION, STARTF_USESTDHANDLES, STARTUPINFOEXW,
};

use super::{Pipe, ProcessStatus, SpawnError};
use crate::handle::Handle;
use crate::pty::PseudoTerminal;

const PROC_THREAD_ATTRIBUTE_PSEUDOCONSOLE: usize = 0x0002_0016;

fn win_err(e: windows::core::Error) -> SpawnError {
    SpawnError::Os(io::Error::from_raw_os_error(e.code().0))
}

fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Quote the program and append arguments into one command line.
fn build_command_line(program: &str, args: &[String]) -> String {
    let mut cmd = format!("\"{}\"", program);
    for arg in args {
        cmd.push(' ');
        cmd.push_str(arg);
    }
    cmd
}

/// Attribute list storage, sized and initialized in two steps. Released on
/// every exit path, including spawn failure.
struct AttrList {
    buffer: Vec<u8>,
    initialized: bool,
}

impl AttrList {
    fn new() -> Result<Self, SpawnError> {
        unsafe {
            let mut size: usize = 0;
            // First call only reports the required size.
            let _ = InitializeProcThreadAttributeList(
                LPPROC_THREAD_ATTRIBUTE_LIST::default(),
                1,
                0,
                &mut size,
            );
            let mut buffer = vec![0u8; size];
            let list = LPPROC_THREAD_ATTRIBUTE_LIST(buffer.as_mut_ptr() as *mut _);
            InitializeProcThreadAttributeList(list, 1, 0, &mut size).map_err(win_err)?;
            Ok(Self {
                buffer,
                initialized: true,
            })
        }
    }

    fn as_list(&mut self) -> LPPROC_THREAD_ATTRIBUTE_LIST {
        LPPROC_THREAD_ATTRIBUTE_LIST(self.buffer.as_mut_ptr() as *mut _)
    }

    fn attach_pseudo_console(&mut self, hpc: HPCON) -> Result<(), SpawnError> {
        unsafe {
            UpdateProcThreadAttribute(
                self.as_list(),
                0,
                PROC_THREAD_ATTRIBUTE_PSEUDOCONSOLE,
                Some(hpc.0 as *const _),
                std::mem::size_of::<HPCON>(),
                None,
                None,
            )
            .map_err(win_err)
        }
    }
}

impl Drop for AttrList {
    fn drop(&mut self) {
        if self.initialized {
            unsafe {
                DeleteProcThreadAttributeList(self.as_list());
            }
        }
    }
}

pub struct Process {
    handle: Handle,
    status: ProcessStatus,
    exit_code: i32,
    leave_running: bool,
    // Kept alive for the process lifetime; freed on drop.
    _attr_list: Option<AttrList>,
}

// The process handle is only touched from the owning session.
unsafe impl Send for Process {}

impl Process {
    fn new(handle: Handle, attr_list: Option<AttrList>) -> Self {
        Self {
            handle,
            status: ProcessStatus::Running,
            exit_code: 1,
            leave_running: false,
            _attr_list: attr_list,
        }
    }

    /// `inherit_handles` must be set for the stdio-pipe path: the child
    /// only sees the `hStd*` handles if it inherits them. The pty path
    /// passes everything through the attribute list and inherits nothing.
    fn create(
        command_line: &str,
        working_directory: &str,
        inherit_handles: bool,
        startup_info: &mut STARTUPINFOEXW,
    ) -> Result<Handle, SpawnError> {
        let mut cmd_wide = to_wide(command_line);
        let dir_wide = to_wide(working_directory);
        let mut info = PROCESS_INFORMATION::default();

        unsafe {
            CreateProcessW(
                PCWSTR::null(),
                PWSTR(cmd_wide.as_mut_ptr()),
                None,
                None,
                inherit_handles,
                EXTENDED_STARTUPINFO_PRESENT,
                None,
                if working_directory.is_empty() {
                    PCWSTR::null()
                } else {
                    PCWSTR(dir_wide.as_ptr())
                },
                &startup_info.StartupInfo,
                &mut info,
            )
            .map_err(|e| {
                tracing::error!("CreateProcessW failed: {}", e);
                win_err(e)
            })?;

            // The thread handle is never used.
            drop(Handle::new(info.hThread));
            Ok(Handle::new(info.hProcess))
        }
    }

    /// Spawn attached to the pty's pseudo-console. The pty is borrowed;
    /// ownership never transfers.
    pub(crate) fn spawn_with_pty(
        program: &str,
        args: &[String],
        working_directory: &str,
        pty: &PseudoTerminal,
    ) -> Result<Self, SpawnError> {
        let mut attr_list = AttrList::new()?;
        attr_list.attach_pseudo_console(pty.pseudo_console())?;

        let mut startup_info = STARTUPINFOEXW::default();
        startup_info.StartupInfo.cb = std::mem::size_of::<STARTUPINFOEXW>() as u32;
        startup_info.StartupInfo.dwFlags = STARTF_USESTDHANDLES;
        startup_info.lpAttributeList = attr_list.as_list();

        let command_line = build_command_line(program, args);
        let handle = Self::create(&command_line, working_directory, false, &mut startup_info)?;
        Ok(Self::new(handle, Some(attr_list)))
    }

    /// Spawn with inheritable stdio pipes.
    pub(crate) fn spawn_with_pipe(
        program: &str,
        args: &[String],
        working_directory: &str,
        with_stderr: bool,
    ) -> Result<(Self, Pipe), SpawnError> {
        unsafe {
            let sa = SECURITY_ATTRIBUTES {
                nLength: std::mem::size_of::<SECURITY_ATTRIBUTES>() as u32,
                lpSecurityDescriptor: std::ptr::null_mut(),
                bInheritHandle: true.into(),
            };

            let mut stdin_read = HANDLE::default();
            let mut stdin_write = HANDLE::default();
            CreatePipe(&mut stdin_read, &mut stdin_write, Some(&sa), 0).map_err(win_err)?;
            let stdin_read = Handle::new(stdin_read);
            let stdin_write = Handle::new(stdin_write);

            let mut stdout_read = HANDLE::default();
            let mut stdout_write = HANDLE::default();
            CreatePipe(&mut stdout_read, &mut stdout_write, Some(&sa), 0).map_err(win_err)?;
            let stdout_read = Handle::new(stdout_read);
            let stdout_write = Handle::new(stdout_write);

            // Our ends must not leak into the child.
            SetHandleInformation(stdin_write.raw(), HANDLE_FLAG_INHERIT.0, Default::default())
                .map_err(win_err)?;
            SetHandleInformation(stdout_read.raw(), HANDLE_FLAG_INHERIT.0, Default::default())
                .map_err(win_err)?;

            let mut startup_info = STARTUPINFOEXW::default();
            startup_info.StartupInfo.cb = std::mem::size_of::<STARTUPINFOEXW>() as u32;
            startup_info.StartupInfo.dwFlags = STARTF_USESTDHANDLES;
            startup_info.StartupInfo.hStdInput = stdin_read.raw();
            startup_info.StartupInfo.hStdOutput = stdout_write.raw();
            if with_stderr {
                startup_info.StartupInfo.hStdError = stdout_write.raw();
            }

            let command_line = build_command_line(program, args);
            let handle = Self::create(&command_line, working_directory, true, &mut startup_info)?;

            Ok((
                Self::new(handle, None),
                Pipe {
                    output: stdout_read,
                    input: stdin_write,
                },
            ))
        }
    }

    /// Non-blocking exit poll. A query error is treated as still running.
    pub fn check_exit_status(&mut self) {
        if self.status == ProcessStatus::Exited {
            return;
        }
        let mut code: u32 = 0;
        unsafe {
            if GetExitCodeProcess(self.handle.raw(), &mut code).is_ok()
                && code != STILL_ACTIVE.0 as u32
            {
                self.status = ProcessStatus::Exited;
                self.exit_code = code as i32;
            }
        }
    }

    /// Block until the child exits.
    pub fn wait_for_exit(&mut self) {
        self.check_exit_status();
        if self.status == ProcessStatus::Running {
            unsafe {
                WaitForSingleObject(self.handle.raw(), INFINITE);
            }
            self.check_exit_status();
        }
    }

    /// Forcibly end the child. Idempotent: once `Exited`, a no-op. Records
    /// a synthetic failure exit code.
    pub fn terminate(&mut self) {
        if self.status == ProcessStatus::Exited {
            return;
        }
        unsafe {
            let _ = TerminateProcess(self.handle.raw(), 1);
        }
        self.exit_code = 1;
        self.status = ProcessStatus::Exited;
        self.handle.close();
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

#[cfg(test)]
mod tests {
    use super::*;
    use windows::Win32::Storage::FileSystem::ReadFile;

    #[test]
    fn stdio_pipe_carries_child_output() {
        let (mut process, pipe) = Process::spawn_with_pipe(
            "cmd.exe",
            &["/c".to_string(), "echo piped".to_string()],
            "",
            false,
        )
        .unwrap();
        process.wait_for_exit();
        assert_eq!(process.exit_code(), Some(0));

        // Our copy of the child's write end is already closed, so the read
        // loop ends with a broken pipe once the output is drained.
        let mut out = Vec::new();
        let mut buf = [0u8; 256];
        loop {
            let mut read: u32 = 0;
            let res =
                unsafe { ReadFile(pipe.output.raw(), Some(&mut buf), Some(&mut read), None) };
            if res.is_err() || read == 0 {
                break;
            }
            out.extend_from_slice(&buf[..read as usize]);
        }
        assert!(String::from_utf8_lossy(&out).contains("piped"));
    }
}
