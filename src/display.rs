//! Presentation-layer boundary
//!
//! A [`DisplaySink`] is the only way screen content leaves the emulator.
//! Exactly one sink observes one [`TerminalState`](crate::term::TerminalState)
//! at a time; attach/detach violations are programming errors and panic.
//!
//! Per update cycle the emulator calls, in order: [`DisplaySink::draw_begin`]
//! (which also announces geometry), zero or more [`DisplaySink::draw_line`]
//! calls each covering a contiguous changed span of one row, at most one
//! [`DisplaySink::draw_cursor`], then [`DisplaySink::draw_end`]. Line spans
//! are authoritative replacements for those cells, not deltas to merge.

use crate::term::Glyph;

pub trait DisplaySink {
    /// Start of an update cycle. Returning `false` abandons the cycle (the
    /// sink is not visible); no further draw calls follow until the next
    /// cycle. Geometry changes arrive here before any line data.
    fn draw_begin(&mut self, columns: u16, rows: u16) -> bool;

    /// One changed span of row `y`: cells `x_start..x_end` of `line`.
    fn draw_line(&mut self, line: &[Glyph], x_start: u16, y: u16, x_end: u16);

    /// The cursor cell, drawn after all line spans.
    fn draw_cursor(&mut self, x: u16, y: u16, glyph: &Glyph);

    /// End of the update cycle.
    fn draw_end(&mut self);

    fn set_title(&mut self, _title: &str) {}

    fn set_icon_title(&mut self, _title: &str) {}

    fn bell(&mut self) {}

    fn set_clipboard(&mut self, _text: &str) {}

    fn get_clipboard(&mut self) -> String {
        String::new()
    }

    /// Palette fully reset to defaults.
    fn reset_colors(&mut self) {}

    /// One palette slot reset, or renamed when `name` is given (OSC 4).
    fn reset_color(&mut self, _index: u8, _name: Option<&str>) {}
}
