//! RAII ownership of a single OS handle
//!
//! Every file descriptor (unix) or `HANDLE` (windows) owned by this crate is
//! wrapped in a [`Handle`] so it is closed exactly once, including on
//! early-return error paths during multi-step acquisition.

#[cfg(unix)]
pub type RawHandle = std::os::unix::io::RawFd;

#[cfg(windows)]
pub type RawHandle = windows::Win32::Foundation::HANDLE;

/// Move-only wrapper around one OS handle.
///
/// Constructing from a raw handle takes ownership. Dropping (or calling
/// [`Handle::close`]) closes the handle; [`Handle::take`] relinquishes
/// ownership, resetting the wrapper to the invalid sentinel.
#[derive(Debug)]
pub struct Handle {
    raw: RawHandle,
}

impl Handle {
    #[cfg(unix)]
    pub const INVALID: RawHandle = -1;

    #[cfg(windows)]
    pub const INVALID: RawHandle = windows::Win32::Foundation::INVALID_HANDLE_VALUE;

    /// Take ownership of `raw`. The handle is closed when `self` is dropped.
    pub fn new(raw: RawHandle) -> Self {
        Self { raw }
    }

    /// A handle holding the invalid sentinel. Closing it is a no-op.
    pub fn invalid() -> Self {
        Self { raw: Self::INVALID }
    }

    pub fn is_valid(&self) -> bool {
        self.raw != Self::INVALID
    }

    /// The raw value, still owned by `self`.
    pub fn raw(&self) -> RawHandle {
        self.raw
    }

    /// Relinquish ownership, returning the raw handle and resetting `self`
    /// to the invalid sentinel.
    pub fn take(&mut self) -> RawHandle {
        std::mem::replace(&mut self.raw, Self::INVALID)
    }

    /// Close now instead of at drop. Idempotent.
    pub fn close(&mut self) {
        let raw = self.take();
        if raw != Self::INVALID {
            close_raw(raw);
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(unix)]
fn close_raw(raw: RawHandle) {
    // EBADF here would mean a double close elsewhere; log, never panic.
    if let Err(err) = nix::unistd::close(raw) {
        tracing::warn!("close({}) failed: {}", raw, err);
    }
}

#[cfg(windows)]
fn close_raw(raw: RawHandle) {
    unsafe {
        let _ = windows::Win32::Foundation::CloseHandle(raw);
    }
}
