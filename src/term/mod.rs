//! Terminal screen model and escape-sequence engine.
//!
//! - **color**: palette, default colors, packed 32-bit boundary encoding
//! - **state**: glyph grid, cursor, selection, window modes
//! - **parser**: streaming VT100/xterm escape-sequence state machine
//!
//! # Architecture
//!
//! ```text
//! Session
//! ├── PseudoTerminal (byte I/O with the child)
//! ├── VtParser (decodes the byte stream)
//! └── TerminalState
//!     ├── Screen (cell grid + dirty tracking)
//!     ├── Cursor (position, shape, pending attributes)
//!     ├── Selection (regular / rectangular)
//!     └── ColorPalette (256 slots + defaults)
//! ```

pub mod color;
pub mod parser;
pub mod state;

pub use color::{Color, ColorPalette, Rgb};
pub use parser::{Response, VtParser};
pub use state::{
    CursorShape, Glyph, GlyphAttrs, Screen, SelectionMode, SelectionSnap, TerminalState, WinMode,
};
