//! Reusable terminal-emulation core.
//!
//! This crate bundles the non-visual parts of a terminal emulator so a
//! host application only has to supply rendering and input:
//!
//! - [`pty`]: pseudo-terminal allocation and byte I/O (openpty on unix,
//!   ConPTY on windows)
//! - [`process`]: child spawning and lifecycle, polymorphic over
//!   [`ProcessFactory`]
//! - [`term`]: the VT100/xterm escape parser and in-memory screen model
//! - [`display`]: the [`DisplaySink`] callback boundary presentation
//!   layers implement
//! - [`session`]: the tick-driven [`Session`] orchestrator tying the
//!   pieces together
//! - [`config`]: TOML session settings
//!
//! # Example
//!
//! ```no_run
//! use ptyterm::{Session, TermConfig};
//!
//! let mut session = Session::spawn(&TermConfig::default())?;
//! loop {
//!     session.update()?;        // drain child output into the screen model
//!     session.draw();           // push dirty rows to the attached sink
//!     if !session.is_alive() {
//!         break;
//!     }
//!     std::thread::sleep(std::time::Duration::from_millis(10));
//! }
//! # Ok::<(), ptyterm::SessionError>(())
//! ```

pub mod config;
pub mod display;
pub mod handle;
pub mod process;
pub mod pty;
pub mod session;
pub mod term;

pub use config::{ConfigError, TermConfig};
pub use display::DisplaySink;
pub use process::{HostProcessFactory, Pipe, Process, ProcessFactory, ProcessStatus, SpawnError};
pub use pty::{PseudoTerminal, PtyError};
pub use session::{Session, SessionError};
pub use term::{
    Color, ColorPalette, CursorShape, Glyph, GlyphAttrs, Response, Rgb, Screen, SelectionMode,
    SelectionSnap, TerminalState, VtParser, WinMode,
};
