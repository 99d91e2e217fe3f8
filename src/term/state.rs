//! In-memory screen model: glyph grid, cursor, selection, window modes.
//!
//! `TerminalState` owns a primary and an alternate [`Screen`] plus all the
//! mutable emulation state the parser drives. It never touches a pty or a
//! process; output reaches the presentation layer only through the attached
//! [`DisplaySink`] during [`TerminalState::draw`].

use bitflags::bitflags;
use unicode_width::UnicodeWidthChar;

use super::color::{Color, ColorPalette};
use crate::display::DisplaySink;

bitflags! {
    /// Per-cell rendering attributes.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct GlyphAttrs: u16 {
        const BOLD       = 0b0000_0000_0001;
        const FAINT      = 0b0000_0000_0010;
        const ITALIC     = 0b0000_0000_0100;
        const UNDERLINE  = 0b0000_0000_1000;
        const STRUCK     = 0b0000_0001_0000;
        const REVERSE    = 0b0000_0010_0000;
        const BLINK      = 0b0000_0100_0000;
        const INVISIBLE  = 0b0000_1000_0000;
        /// First cell of a double-width character.
        const WIDE       = 0b0001_0000_0000;
        /// Trailing cell of a double-width character. Never rendered.
        const WIDE_DUMMY = 0b0010_0000_0000;
        /// Box-drawing character the renderer may draw geometrically.
        const BOXDRAW    = 0b0100_0000_0000;
        const EMOJI      = 0b1000_0000_0000;
    }
}

bitflags! {
    /// Window-level state shared with the presentation layer.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct WinMode: u8 {
        const VISIBLE       = 0b0000_0001;
        const FOCUSED       = 0b0000_0010;
        /// A focus-report escape is owed to the child.
        const FOCUS_PENDING = 0b0000_0100;
        const BLINK         = 0b0000_1000;
        /// DECSCNM screen-wide reverse video.
        const REVERSE       = 0b0001_0000;
        /// DECTCEM cursor hidden.
        const HIDDEN        = 0b0010_0000;
    }
}

/// One screen cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Glyph {
    pub ch: char,
    pub fg: Color,
    pub bg: Color,
    pub attrs: GlyphAttrs,
}

impl Default for Glyph {
    fn default() -> Self {
        Self {
            ch: ' ',
            fg: Color::Default,
            bg: Color::Default,
            attrs: GlyphAttrs::empty(),
        }
    }
}

impl Glyph {
    /// Padding cell used for fresh and resized screen area.
    fn hidden() -> Self {
        Self {
            attrs: GlyphAttrs::INVISIBLE,
            ..Self::default()
        }
    }
}

/// Flat cell grid with per-row dirty and soft-wrap tracking.
///
/// The buffer length is always exactly `columns * rows`.
pub struct Screen {
    columns: u16,
    rows: u16,
    cells: Vec<Glyph>,
    dirty: Vec<bool>,
    wrapped: Vec<bool>,
}

impl Screen {
    pub fn new(columns: u16, rows: u16) -> Self {
        let columns = columns.max(1);
        let rows = rows.max(1);
        Self {
            columns,
            rows,
            cells: vec![Glyph::hidden(); columns as usize * rows as usize],
            dirty: vec![true; rows as usize],
            wrapped: vec![false; rows as usize],
        }
    }

    pub fn columns(&self) -> u16 {
        self.columns
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    fn index(&self, x: u16, y: u16) -> usize {
        debug_assert!(x < self.columns && y < self.rows);
        y as usize * self.columns as usize + x as usize
    }

    pub fn glyph(&self, x: u16, y: u16) -> &Glyph {
        &self.cells[self.index(x, y)]
    }

    pub fn glyph_mut(&mut self, x: u16, y: u16) -> &mut Glyph {
        let i = self.index(x, y);
        &mut self.cells[i]
    }

    pub fn row(&self, y: u16) -> &[Glyph] {
        let start = self.index(0, y);
        &self.cells[start..start + self.columns as usize]
    }

    pub fn row_mut(&mut self, y: u16) -> &mut [Glyph] {
        let start = self.index(0, y);
        let columns = self.columns as usize;
        &mut self.cells[start..start + columns]
    }

    /// Overwrite row `to` with row `from`, carrying the wrap flag along.
    fn copy_row(&mut self, from: u16, to: u16) {
        let columns = self.columns as usize;
        let src = self.index(0, from);
        let dst = self.index(0, to);
        self.cells.copy_within(src..src + columns, dst);
        self.wrapped[to as usize] = self.wrapped[from as usize];
        self.dirty[to as usize] = true;
    }

    pub fn is_dirty(&self, y: u16) -> bool {
        self.dirty[y as usize]
    }

    pub fn mark_dirty(&mut self, y: u16) {
        self.dirty[y as usize] = true;
    }

    pub fn set_dirty(&mut self, y: u16, dirty: bool) {
        self.dirty[y as usize] = dirty;
    }

    pub fn mark_all_dirty(&mut self) {
        self.dirty.fill(true);
    }

    pub fn is_wrapped(&self, y: u16) -> bool {
        self.wrapped[y as usize]
    }

    pub fn set_wrapped(&mut self, y: u16, wrapped: bool) {
        self.wrapped[y as usize] = wrapped;
    }

    /// Resize preserving the overlapping top-left region; new area is
    /// padded with hidden blanks. Everything ends up dirty.
    pub fn resize(&mut self, columns: u16, rows: u16) {
        let columns = columns.max(1);
        let rows = rows.max(1);
        if columns == self.columns && rows == self.rows {
            return;
        }
        let mut cells = vec![Glyph::hidden(); columns as usize * rows as usize];
        let copy_cols = columns.min(self.columns) as usize;
        for y in 0..rows.min(self.rows) {
            let src = self.index(0, y);
            let dst = y as usize * columns as usize;
            cells[dst..dst + copy_cols].copy_from_slice(&self.cells[src..src + copy_cols]);
        }
        let mut wrapped = vec![false; rows as usize];
        for y in 0..rows.min(self.rows) {
            // A narrower grid invalidates the old wrap points anyway.
            wrapped[y as usize] = self.wrapped[y as usize] && columns >= self.columns;
        }
        self.cells = cells;
        self.dirty = vec![true; rows as usize];
        self.wrapped = wrapped;
        self.columns = columns;
        self.rows = rows;
    }
}

/// Cursor shape as negotiated by DECSCUSR (`CSI Ps SP q`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorShape {
    /// Terminal-dependent default.
    Default,
    BlinkingBlock,
    SteadyBlock,
    BlinkingUnderline,
    SteadyUnderline,
    BlinkingBar,
    SteadyBar,
}

impl Default for CursorShape {
    fn default() -> Self {
        Self::BlinkingBlock
    }
}

impl CursorShape {
    pub fn to_decscusr(&self) -> u8 {
        match self {
            CursorShape::Default => 0,
            CursorShape::BlinkingBlock => 1,
            CursorShape::SteadyBlock => 2,
            CursorShape::BlinkingUnderline => 3,
            CursorShape::SteadyUnderline => 4,
            CursorShape::BlinkingBar => 5,
            CursorShape::SteadyBar => 6,
        }
    }

    pub fn from_decscusr(n: u8) -> Self {
        match n {
            1 => CursorShape::BlinkingBlock,
            2 => CursorShape::SteadyBlock,
            3 => CursorShape::BlinkingUnderline,
            4 => CursorShape::SteadyUnderline,
            5 => CursorShape::BlinkingBar,
            6 => CursorShape::SteadyBar,
            _ => CursorShape::Default,
        }
    }
}

/// Attributes applied to newly written cells (SGR state).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CellAttrs {
    pub fg: Color,
    pub bg: Color,
    pub flags: GlyphAttrs,
}

#[derive(Clone, Copy, Debug, Default)]
struct Cursor {
    x: u16,
    y: u16,
}

#[derive(Clone, Copy, Debug, Default)]
struct SavedCursor {
    x: u16,
    y: u16,
    attrs: CellAttrs,
}

/// Input-affecting and write-affecting terminal modes.
#[derive(Clone, Copy, Debug)]
pub struct TerminalModes {
    pub auto_wrap: bool,
    pub insert: bool,
    pub application_cursor: bool,
    pub bracketed_paste: bool,
    pub focus_report: bool,
    pub allow_alt_screen: bool,
}

impl Default for TerminalModes {
    fn default() -> Self {
        Self {
            auto_wrap: true,
            insert: false,
            application_cursor: false,
            bracketed_paste: false,
            focus_report: false,
            allow_alt_screen: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionMode {
    Regular,
    Rectangular,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionSnap {
    None,
    Word,
    Line,
}

#[derive(Clone, Copy, Debug)]
struct Selection {
    mode: SelectionMode,
    snap: SelectionSnap,
    anchor: (u16, u16),
    point: (u16, u16),
}

const PRIMARY: usize = 0;
const ALTERNATE: usize = 1;

/// The complete emulation state of one terminal.
pub struct TerminalState {
    screens: [Screen; 2],
    active: usize,
    cursor: Cursor,
    saved_cursor: [SavedCursor; 2],
    pub attrs: CellAttrs,
    pub modes: TerminalModes,
    win_mode: WinMode,
    cursor_shape: CursorShape,
    scroll_top: u16,
    scroll_bottom: u16,
    title: String,
    icon_title: String,
    selection: Option<Selection>,
    pub palette: ColorPalette,
    sink: Option<Box<dyn DisplaySink>>,
}

impl TerminalState {
    pub fn new(columns: u16, rows: u16) -> Self {
        let columns = columns.max(1);
        let rows = rows.max(1);
        Self {
            screens: [Screen::new(columns, rows), Screen::new(columns, rows)],
            active: PRIMARY,
            cursor: Cursor::default(),
            saved_cursor: [SavedCursor::default(); 2],
            attrs: CellAttrs::default(),
            modes: TerminalModes::default(),
            win_mode: WinMode::VISIBLE | WinMode::FOCUSED,
            cursor_shape: CursorShape::default(),
            scroll_top: 0,
            scroll_bottom: rows - 1,
            title: String::new(),
            icon_title: String::new(),
            selection: None,
            palette: ColorPalette::new(),
            sink: None,
        }
    }

    pub fn columns(&self) -> u16 {
        self.screens[self.active].columns()
    }

    pub fn rows(&self) -> u16 {
        self.screens[self.active].rows()
    }

    pub fn screen(&self) -> &Screen {
        &self.screens[self.active]
    }

    fn screen_mut(&mut self) -> &mut Screen {
        &mut self.screens[self.active]
    }

    pub fn is_alt_screen(&self) -> bool {
        self.active == ALTERNATE
    }

    /// Cursor position, clamped into the grid (the x coordinate may rest
    /// one past the last column while a wrap is pending).
    pub fn cursor(&self) -> (u16, u16) {
        (self.cursor.x.min(self.columns() - 1), self.cursor.y)
    }

    pub fn cursor_shape(&self) -> CursorShape {
        self.cursor_shape
    }

    pub fn set_cursor_shape(&mut self, shape: CursorShape) {
        self.cursor_shape = shape;
    }

    pub fn cursor_visible(&self) -> bool {
        !self.win_mode.contains(WinMode::HIDDEN)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn icon_title(&self) -> &str {
        &self.icon_title
    }

    pub fn win_mode(&self) -> WinMode {
        self.win_mode
    }

    // ---- sink ----

    /// Attach the presentation sink. Exactly one may be attached; attaching
    /// over an existing sink is a programming error.
    pub fn attach_sink(&mut self, sink: Box<dyn DisplaySink>) {
        assert!(self.sink.is_none(), "display sink already attached");
        self.sink = Some(sink);
    }

    /// Detach and return the sink. Detaching with none attached is a
    /// programming error.
    pub fn detach_sink(&mut self) -> Box<dyn DisplaySink> {
        match self.sink.take() {
            Some(sink) => sink,
            None => panic!("no display sink attached"),
        }
    }

    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    // ---- character output ----

    /// Write one printable character at the cursor, honoring pending wrap,
    /// insert mode, and wide-character pairing.
    pub fn put_char(&mut self, ch: char) {
        let width = match ch.width() {
            // Zero-width combining marks do not occupy a cell.
            Some(0) | None => return,
            Some(w) => w as u16,
        };
        let columns = self.columns();
        if width > columns {
            return;
        }

        if self.cursor.x + width > columns {
            if self.modes.auto_wrap {
                let y = self.cursor.y;
                self.screen_mut().set_wrapped(y, true);
                self.cursor.x = 0;
                self.linefeed();
            } else {
                self.cursor.x = columns - width;
            }
        }

        if self.modes.insert {
            self.insert_chars(width);
        }

        let x = self.cursor.x;
        let y = self.cursor.y;
        self.repair_wide_overlap(x, y, width);

        let mut flags = self.attrs.flags;
        if ('\u{2500}'..='\u{257F}').contains(&ch) {
            flags.insert(GlyphAttrs::BOXDRAW);
        }
        if width == 2 {
            flags.insert(GlyphAttrs::WIDE);
            if (ch as u32) >= 0x1F000 {
                flags.insert(GlyphAttrs::EMOJI);
            }
        }
        let fg = self.attrs.fg;
        let bg = self.attrs.bg;
        *self.screen_mut().glyph_mut(x, y) = Glyph { ch, fg, bg, attrs: flags };
        if width == 2 {
            let mut dummy_flags = self.attrs.flags;
            dummy_flags.insert(GlyphAttrs::WIDE_DUMMY);
            *self.screen_mut().glyph_mut(x + 1, y) = Glyph {
                ch: ' ',
                fg,
                bg,
                attrs: dummy_flags,
            };
        }
        self.screen_mut().mark_dirty(y);
        self.cursor.x = x + width;
    }

    /// Overwriting half of a wide pair must not leave the other half
    /// orphaned: the surviving cell becomes a plain blank.
    fn repair_wide_overlap(&mut self, x: u16, y: u16, width: u16) {
        let columns = self.columns();
        if x > 0 && self.screen().glyph(x, y).attrs.contains(GlyphAttrs::WIDE_DUMMY) {
            let left = self.screen_mut().glyph_mut(x - 1, y);
            left.ch = ' ';
            left.attrs.remove(GlyphAttrs::WIDE);
        }
        let end = x + width;
        if end < columns && self.screen().glyph(end, y).attrs.contains(GlyphAttrs::WIDE_DUMMY) {
            let right = self.screen_mut().glyph_mut(end, y);
            right.ch = ' ';
            right.attrs.remove(GlyphAttrs::WIDE_DUMMY);
        }
    }

    // ---- cursor motion ----

    pub fn linefeed(&mut self) {
        if self.cursor.y == self.scroll_bottom {
            self.scroll_up(self.scroll_top, 1);
        } else if self.cursor.y + 1 < self.rows() {
            self.cursor.y += 1;
        }
    }

    /// ESC M: move up, scrolling the region down at the top margin.
    pub fn reverse_index(&mut self) {
        if self.cursor.y == self.scroll_top {
            self.scroll_down(self.scroll_top, 1);
        } else if self.cursor.y > 0 {
            self.cursor.y -= 1;
        }
    }

    pub fn carriage_return(&mut self) {
        self.cursor.x = 0;
    }

    pub fn backspace(&mut self) {
        self.cursor.x = self.cursor().0.saturating_sub(1);
    }

    /// Move `count` tab stops forward (positive) or backward (negative).
    /// Stops are fixed every eight columns.
    pub fn put_tab(&mut self, count: i32) {
        let columns = self.columns();
        let mut x = self.cursor.x.min(columns - 1);
        let mut n = count;
        while n > 0 && x < columns - 1 {
            x = ((x / 8) + 1) * 8;
            n -= 1;
        }
        while n < 0 && x > 0 {
            x = ((x - 1) / 8) * 8;
            n += 1;
        }
        self.cursor.x = x.min(columns - 1);
    }

    pub fn cursor_up(&mut self, count: u16) {
        self.cursor.y = self.cursor.y.saturating_sub(count.max(1));
    }

    pub fn cursor_down(&mut self, count: u16) {
        self.cursor.y = self.cursor.y.saturating_add(count.max(1)).min(self.rows() - 1);
    }

    pub fn cursor_forward(&mut self, count: u16) {
        self.cursor.x = self
            .cursor()
            .0
            .saturating_add(count.max(1))
            .min(self.columns() - 1);
    }

    pub fn cursor_backward(&mut self, count: u16) {
        self.cursor.x = self.cursor().0.saturating_sub(count.max(1));
    }

    /// CUP with 1-based coordinates, clamped.
    pub fn cursor_position(&mut self, row: u16, col: u16) {
        self.cursor.y = row.max(1).min(self.rows()) - 1;
        self.cursor.x = col.max(1).min(self.columns()) - 1;
    }

    /// CHA: 1-based column on the current row.
    pub fn cursor_to_column(&mut self, col: u16) {
        self.cursor.x = col.max(1).min(self.columns()) - 1;
    }

    /// VPA: 1-based row in the current column.
    pub fn cursor_to_row(&mut self, row: u16) {
        self.cursor.y = row.max(1).min(self.rows()) - 1;
    }

    pub fn save_cursor(&mut self) {
        self.saved_cursor[self.active] = SavedCursor {
            x: self.cursor.x,
            y: self.cursor.y,
            attrs: self.attrs,
        };
    }

    pub fn restore_cursor(&mut self) {
        let saved = self.saved_cursor[self.active];
        self.cursor.x = saved.x.min(self.columns() - 1);
        self.cursor.y = saved.y.min(self.rows() - 1);
        self.attrs = saved.attrs;
    }

    // ---- scrolling ----

    /// DECSTBM with 1-based bounds; degenerate regions reset to full
    /// screen. The cursor homes afterwards.
    pub fn set_scroll_region(&mut self, top: u16, bottom: u16) {
        let rows = self.rows();
        let top = top.max(1) - 1;
        let bottom = if bottom == 0 { rows - 1 } else { bottom.min(rows) - 1 };
        if top < bottom {
            self.scroll_top = top;
            self.scroll_bottom = bottom;
        } else {
            self.scroll_top = 0;
            self.scroll_bottom = rows - 1;
        }
        self.cursor = Cursor::default();
    }

    pub fn scroll_region(&self) -> (u16, u16) {
        (self.scroll_top, self.scroll_bottom)
    }

    /// Scroll `[origin, scroll_bottom]` up by `count`, blanking the bottom.
    pub fn scroll_up(&mut self, origin: u16, count: u16) {
        let bottom = self.scroll_bottom;
        if origin > bottom {
            return;
        }
        let n = count.max(1).min(bottom - origin + 1);
        self.shift_selection(origin, bottom, -(n as i32));
        let blank = self.blank_glyph();
        let screen = self.screen_mut();
        for y in origin..=bottom.saturating_sub(n) {
            if y + n > bottom {
                break;
            }
            screen.copy_row(y + n, y);
        }
        for y in bottom - (n - 1)..=bottom {
            screen.row_mut(y).fill(blank);
            screen.set_wrapped(y, false);
            screen.mark_dirty(y);
        }
    }

    /// Scroll `[origin, scroll_bottom]` down by `count`, blanking the top.
    pub fn scroll_down(&mut self, origin: u16, count: u16) {
        let bottom = self.scroll_bottom;
        if origin > bottom {
            return;
        }
        let n = count.max(1).min(bottom - origin + 1);
        self.shift_selection(origin, bottom, n as i32);
        let blank = self.blank_glyph();
        let screen = self.screen_mut();
        for y in (origin + n..=bottom).rev() {
            screen.copy_row(y - n, y);
        }
        for y in origin..origin + n {
            screen.row_mut(y).fill(blank);
            screen.set_wrapped(y, false);
            screen.mark_dirty(y);
        }
    }

    /// Move the selection along with scrolled content, clearing it when it
    /// would cross a region boundary.
    fn shift_selection(&mut self, top: u16, bottom: u16, delta: i32) {
        let Some(sel) = self.selection else { return };
        let in_region = |y: u16| (top..=bottom).contains(&y);
        if !in_region(sel.anchor.1) && !in_region(sel.point.1) {
            return;
        }
        let a = sel.anchor.1 as i32 + delta;
        let p = sel.point.1 as i32 + delta;
        if a < top as i32 || a > bottom as i32 || p < top as i32 || p > bottom as i32 {
            self.selection = None;
        } else if let Some(sel) = self.selection.as_mut() {
            sel.anchor.1 = a as u16;
            sel.point.1 = p as u16;
        }
    }

    // ---- erasing and editing ----

    /// Blank cell carrying the current colors, as erased area should.
    fn blank_glyph(&self) -> Glyph {
        Glyph {
            ch: ' ',
            fg: self.attrs.fg,
            bg: self.attrs.bg,
            attrs: GlyphAttrs::empty(),
        }
    }

    fn clear_region(&mut self, x1: u16, y1: u16, x2: u16, y2: u16) {
        let columns = self.columns();
        let rows = self.rows();
        let (x1, x2) = (x1.min(columns - 1), x2.min(columns - 1));
        let (y1, y2) = (y1.min(rows - 1), y2.min(rows - 1));
        if x1 > x2 || y1 > y2 {
            return;
        }
        if let Some(sel) = self.selection {
            let (lo, hi) = if sel.anchor.1 <= sel.point.1 {
                (sel.anchor.1, sel.point.1)
            } else {
                (sel.point.1, sel.anchor.1)
            };
            if lo <= y2 && hi >= y1 {
                self.selection = None;
            }
        }
        let blank = self.blank_glyph();
        let screen = self.screen_mut();
        for y in y1..=y2 {
            screen.set_wrapped(y, false);
            screen.mark_dirty(y);
            for cell in &mut screen.row_mut(y)[x1 as usize..=x2 as usize] {
                *cell = blank;
            }
        }
    }

    /// ED: 0 below, 1 above, 2/3 all.
    pub fn erase_in_display(&mut self, mode: u16) {
        let (x, y) = self.cursor();
        let columns = self.columns();
        let rows = self.rows();
        match mode {
            0 => {
                self.clear_region(x, y, columns - 1, y);
                if y + 1 < rows {
                    self.clear_region(0, y + 1, columns - 1, rows - 1);
                }
            }
            1 => {
                if y > 0 {
                    self.clear_region(0, 0, columns - 1, y - 1);
                }
                self.clear_region(0, y, x, y);
            }
            2 | 3 => self.clear_region(0, 0, columns - 1, rows - 1),
            _ => tracing::debug!("unhandled ED mode {}", mode),
        }
    }

    /// EL: 0 right of cursor, 1 left, 2 whole line.
    pub fn erase_in_line(&mut self, mode: u16) {
        let (x, y) = self.cursor();
        let columns = self.columns();
        match mode {
            0 => self.clear_region(x, y, columns - 1, y),
            1 => self.clear_region(0, y, x, y),
            2 => self.clear_region(0, y, columns - 1, y),
            _ => tracing::debug!("unhandled EL mode {}", mode),
        }
    }

    /// ECH: blank `count` cells at the cursor without shifting.
    pub fn erase_chars(&mut self, count: u16) {
        let (x, y) = self.cursor();
        let n = count.max(1);
        self.clear_region(x, y, x.saturating_add(n - 1), y);
    }

    /// ICH: shift the rest of the row right, inserting blanks.
    pub fn insert_chars(&mut self, count: u16) {
        let columns = self.columns();
        let (x, y) = self.cursor();
        let n = count.max(1).min(columns - x);
        let blank = self.blank_glyph();
        let screen = self.screen_mut();
        let row = screen.row_mut(y);
        row.copy_within(x as usize..(columns - n) as usize, (x + n) as usize);
        row[x as usize..(x + n) as usize].fill(blank);
        screen.mark_dirty(y);
    }

    /// DCH: shift the rest of the row left, blanking the tail.
    pub fn delete_chars(&mut self, count: u16) {
        let columns = self.columns();
        let (x, y) = self.cursor();
        let n = count.max(1).min(columns - x);
        let blank = self.blank_glyph();
        let screen = self.screen_mut();
        let row = screen.row_mut(y);
        row.copy_within((x + n) as usize..columns as usize, x as usize);
        row[(columns - n) as usize..].fill(blank);
        screen.mark_dirty(y);
    }

    /// IL: insert blank lines at the cursor, inside the scroll region only.
    pub fn insert_lines(&mut self, count: u16) {
        if (self.scroll_top..=self.scroll_bottom).contains(&self.cursor.y) {
            self.scroll_down(self.cursor.y, count.max(1));
        }
    }

    /// DL: delete lines at the cursor, inside the scroll region only.
    pub fn delete_lines(&mut self, count: u16) {
        if (self.scroll_top..=self.scroll_bottom).contains(&self.cursor.y) {
            self.scroll_up(self.cursor.y, count.max(1));
        }
    }

    // ---- modes ----

    /// DECSET/DECRST private modes.
    pub fn set_private_mode(&mut self, mode: u16, enable: bool) {
        match mode {
            1 => self.modes.application_cursor = enable,
            5 => self.set_win_mode(WinMode::REVERSE, enable),
            7 => self.modes.auto_wrap = enable,
            25 => {
                self.win_mode.set(WinMode::HIDDEN, !enable);
                let y = self.cursor.y;
                self.screen_mut().mark_dirty(y);
            }
            47 => self.switch_screen(enable, false),
            1047 => self.switch_screen(enable, true),
            1048 => {
                if enable {
                    self.save_cursor();
                } else {
                    self.restore_cursor();
                }
            }
            1049 => {
                if enable {
                    self.save_cursor();
                    self.switch_screen(true, true);
                } else {
                    self.switch_screen(false, true);
                    self.restore_cursor();
                }
            }
            1004 => self.modes.focus_report = enable,
            2004 => self.modes.bracketed_paste = enable,
            _ => tracing::debug!("unhandled private mode {} = {}", mode, enable),
        }
    }

    /// SM/RM public modes.
    pub fn set_mode(&mut self, mode: u16, enable: bool) {
        match mode {
            4 => self.modes.insert = enable,
            _ => tracing::debug!("unhandled mode {} = {}", mode, enable),
        }
    }

    /// Switch between the primary and alternate screen. With `clear`, the
    /// alternate screen content is wiped on entry and exit.
    fn switch_screen(&mut self, to_alt: bool, clear: bool) {
        if to_alt && !self.modes.allow_alt_screen {
            return;
        }
        let target = if to_alt { ALTERNATE } else { PRIMARY };
        if self.active == target {
            return;
        }
        self.selection = None;
        if !to_alt && clear {
            let (columns, rows) = (self.columns(), self.rows());
            self.clear_region(0, 0, columns - 1, rows - 1);
        }
        self.active = target;
        if to_alt && clear {
            let (columns, rows) = (self.columns(), self.rows());
            self.clear_region(0, 0, columns - 1, rows - 1);
        }
        self.screen_mut().mark_all_dirty();
    }

    pub fn set_win_mode(&mut self, flag: WinMode, enable: bool) {
        let was_reversed = self.win_mode.contains(WinMode::REVERSE);
        self.win_mode.set(flag, enable);
        // Screen-wide reverse video invalidates every cell at once.
        if self.win_mode.contains(WinMode::REVERSE) != was_reversed {
            self.screen_mut().mark_all_dirty();
        }
    }

    /// Record a focus change. The report escape (if mode 1004 is on) is
    /// picked up later via [`TerminalState::take_focus_report`].
    pub fn set_focus(&mut self, focused: bool) {
        if self.win_mode.contains(WinMode::FOCUSED) == focused {
            return;
        }
        self.win_mode.set(WinMode::FOCUSED, focused);
        if self.modes.focus_report {
            self.win_mode.insert(WinMode::FOCUS_PENDING);
        }
    }

    /// Bytes owed to the child for a pending focus change, if any.
    pub fn take_focus_report(&mut self) -> Option<&'static [u8]> {
        if !self.win_mode.contains(WinMode::FOCUS_PENDING) {
            return None;
        }
        self.win_mode.remove(WinMode::FOCUS_PENDING);
        Some(if self.win_mode.contains(WinMode::FOCUSED) {
            b"\x1b[I"
        } else {
            b"\x1b[O"
        })
    }

    // ---- OSC-driven state ----

    pub fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
        if let Some(sink) = self.sink.as_mut() {
            sink.set_title(&self.title);
        }
    }

    pub fn set_icon_title(&mut self, title: &str) {
        self.icon_title = title.to_string();
        if let Some(sink) = self.sink.as_mut() {
            sink.set_icon_title(&self.icon_title);
        }
    }

    pub fn bell(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            sink.bell();
        }
    }

    pub fn set_clipboard(&mut self, text: &str) {
        if let Some(sink) = self.sink.as_mut() {
            sink.set_clipboard(text);
        }
    }

    /// Clipboard text as the sink reports it; empty without a sink.
    pub fn clipboard_contents(&mut self) -> String {
        match self.sink.as_mut() {
            Some(sink) => sink.get_clipboard(),
            None => String::new(),
        }
    }

    /// OSC 4: name a palette slot. The sink is told so it can re-resolve.
    pub fn set_color_name(&mut self, index: u8, name: &str) {
        self.palette.set_name(index, name);
        if let Some(sink) = self.sink.as_mut() {
            sink.reset_color(index, Some(name));
        }
        self.screen_mut().mark_all_dirty();
    }

    /// OSC 104 with an index: reset one palette slot.
    pub fn reset_color(&mut self, index: u8) {
        self.palette.reset(index);
        if let Some(sink) = self.sink.as_mut() {
            sink.reset_color(index, None);
        }
        self.screen_mut().mark_all_dirty();
    }

    /// OSC 104 without parameters: reset the whole palette.
    pub fn reset_colors(&mut self) {
        self.palette.reset_all();
        if let Some(sink) = self.sink.as_mut() {
            sink.reset_colors();
        }
        self.screen_mut().mark_all_dirty();
    }

    // ---- lifecycle ----

    /// RIS: back to power-on state. Geometry, the attached sink, and the
    /// alt-screen policy survive.
    pub fn reset(&mut self) {
        let columns = self.columns();
        let rows = self.rows();
        let allow_alt = self.modes.allow_alt_screen;
        self.screens = [Screen::new(columns, rows), Screen::new(columns, rows)];
        self.active = PRIMARY;
        self.cursor = Cursor::default();
        self.saved_cursor = [SavedCursor::default(); 2];
        self.attrs = CellAttrs::default();
        self.modes = TerminalModes {
            allow_alt_screen: allow_alt,
            ..TerminalModes::default()
        };
        self.win_mode = WinMode::VISIBLE | (self.win_mode & WinMode::FOCUSED);
        self.cursor_shape = CursorShape::default();
        self.scroll_top = 0;
        self.scroll_bottom = rows - 1;
        self.selection = None;
        self.palette.reset_all();
    }

    /// Resize both screens, clamping the cursor and resetting the scroll
    /// region. A selection left entirely outside the new grid is cleared;
    /// otherwise its endpoints are clamped.
    pub fn resize(&mut self, columns: u16, rows: u16) {
        let columns = columns.max(1);
        let rows = rows.max(1);
        if columns == self.columns() && rows == self.rows() {
            return;
        }
        for screen in &mut self.screens {
            screen.resize(columns, rows);
        }
        self.cursor.x = self.cursor.x.min(columns - 1);
        self.cursor.y = self.cursor.y.min(rows - 1);
        for saved in &mut self.saved_cursor {
            saved.x = saved.x.min(columns - 1);
            saved.y = saved.y.min(rows - 1);
        }
        self.scroll_top = 0;
        self.scroll_bottom = rows - 1;
        if let Some(sel) = self.selection {
            let outside = |p: (u16, u16)| p.0 >= columns || p.1 >= rows;
            if outside(sel.anchor) && outside(sel.point) {
                self.selection = None;
            } else if let Some(sel) = self.selection.as_mut() {
                sel.anchor.0 = sel.anchor.0.min(columns - 1);
                sel.anchor.1 = sel.anchor.1.min(rows - 1);
                sel.point.0 = sel.point.0.min(columns - 1);
                sel.point.1 = sel.point.1.min(rows - 1);
            }
        }
    }

    // ---- selection ----

    pub fn selection_start(&mut self, x: u16, y: u16, mode: SelectionMode, snap: SelectionSnap) {
        let x = x.min(self.columns() - 1);
        let y = y.min(self.rows() - 1);
        self.selection = Some(Selection {
            mode,
            snap,
            anchor: (x, y),
            point: (x, y),
        });
        self.screen_mut().mark_dirty(y);
    }

    /// Move the live end of the selection, possibly switching mode or
    /// snap mid-drag. A no-op without a prior [`TerminalState::selection_start`].
    pub fn selection_extend(&mut self, x: u16, y: u16, mode: SelectionMode, snap: SelectionSnap) {
        let x = x.min(self.columns() - 1);
        let y = y.min(self.rows() - 1);
        let Some(sel) = self.selection.as_mut() else { return };
        let old = sel.point.1;
        sel.point = (x, y);
        sel.mode = mode;
        sel.snap = snap;
        let anchor_y = sel.anchor.1;
        let lo = y.min(old).min(anchor_y);
        let hi = y.max(old).max(anchor_y);
        for row in lo..=hi {
            self.screen_mut().mark_dirty(row);
        }
    }

    pub fn selection_clear(&mut self) {
        if let Some(sel) = self.selection.take() {
            let lo = sel.anchor.1.min(sel.point.1);
            let hi = sel.anchor.1.max(sel.point.1);
            for row in lo..=hi {
                self.screen_mut().mark_dirty(row);
            }
        }
    }

    pub fn has_selection(&self) -> bool {
        self.selection.is_some()
    }

    /// Reading-order (or bounding-box, for rectangular) endpoints with the
    /// snap policy applied.
    fn selection_bounds(&self) -> Option<(SelectionMode, (u16, u16), (u16, u16))> {
        let sel = self.selection?;
        let (mut start, mut end) = match sel.mode {
            SelectionMode::Rectangular => (
                (sel.anchor.0.min(sel.point.0), sel.anchor.1.min(sel.point.1)),
                (sel.anchor.0.max(sel.point.0), sel.anchor.1.max(sel.point.1)),
            ),
            SelectionMode::Regular => {
                if (sel.anchor.1, sel.anchor.0) <= (sel.point.1, sel.point.0) {
                    (sel.anchor, sel.point)
                } else {
                    (sel.point, sel.anchor)
                }
            }
        };
        match sel.snap {
            SelectionSnap::None => {}
            SelectionSnap::Line => {
                start.0 = 0;
                end.0 = self.columns() - 1;
            }
            SelectionSnap::Word => {
                start.0 = self.snap_word(start.0, start.1, -1);
                end.0 = self.snap_word(end.0, end.1, 1);
            }
        }
        Some((sel.mode, start, end))
    }

    /// Extend `x` along row `y` over word characters (anything but a plain
    /// blank; wide-pair trailers belong to their word).
    fn snap_word(&self, start: u16, y: u16, dir: i32) -> u16 {
        let columns = self.columns();
        let screen = self.screen();
        let mut x = start.min(columns - 1);
        let is_break =
            |g: &Glyph| g.ch == ' ' && !g.attrs.contains(GlyphAttrs::WIDE_DUMMY);
        if is_break(screen.glyph(x, y)) {
            return x;
        }
        loop {
            let next = x as i32 + dir;
            if next < 0 || next >= columns as i32 {
                break;
            }
            if is_break(screen.glyph(next as u16, y)) {
                break;
            }
            x = next as u16;
        }
        x
    }

    pub fn is_selected(&self, x: u16, y: u16) -> bool {
        let Some((mode, start, end)) = self.selection_bounds() else {
            return false;
        };
        if y < start.1 || y > end.1 {
            return false;
        }
        match mode {
            SelectionMode::Rectangular => x >= start.0 && x <= end.0,
            SelectionMode::Regular => {
                (y != start.1 || x >= start.0) && (y != end.1 || x <= end.0)
            }
        }
    }

    /// Extract the selected text. Trailing blanks are trimmed per row;
    /// soft-wrapped rows join without a newline in regular mode.
    pub fn selection_text(&self) -> Option<String> {
        let (mode, start, end) = self.selection_bounds()?;
        let columns = self.columns();
        let screen = self.screen();
        let mut out = String::new();
        for y in start.1..=end.1 {
            let (x1, x2) = match mode {
                SelectionMode::Rectangular => (start.0, end.0),
                SelectionMode::Regular => (
                    if y == start.1 { start.0 } else { 0 },
                    if y == end.1 { end.0 } else { columns - 1 },
                ),
            };
            let mut line = String::new();
            for x in x1..=x2 {
                let g = screen.glyph(x, y);
                if g.attrs.contains(GlyphAttrs::WIDE_DUMMY) {
                    continue;
                }
                line.push(g.ch);
            }
            out.push_str(line.trim_end());
            if y != end.1 && (mode == SelectionMode::Rectangular || !screen.is_wrapped(y)) {
                out.push('\n');
            }
        }
        Some(out)
    }

    // ---- drawing ----

    /// Push dirty rows through the attached sink, then the cursor cell.
    /// Selected cells are drawn with reverse toggled. Rows are cleaned
    /// only after a completed cycle; a declined `draw_begin` leaves the
    /// dirty set intact for the next attempt.
    pub fn draw(&mut self) {
        let columns = self.columns();
        let rows = self.rows();
        let Some(mut sink) = self.sink.take() else { return };
        if !sink.draw_begin(columns, rows) {
            self.sink = Some(sink);
            return;
        }
        let mut line = Vec::with_capacity(columns as usize);
        for y in 0..rows {
            if !self.screen().is_dirty(y) {
                continue;
            }
            line.clear();
            line.extend_from_slice(self.screen().row(y));
            if self.has_selection() {
                for x in 0..columns {
                    if self.is_selected(x, y) {
                        line[x as usize].attrs.toggle(GlyphAttrs::REVERSE);
                    }
                }
            }
            sink.draw_line(&line, 0, y, columns);
            self.screen_mut().set_dirty(y, false);
        }
        if self.cursor_visible() {
            let (x, y) = self.cursor();
            let glyph = *self.screen().glyph(x, y);
            sink.draw_cursor(x, y, &glyph);
        }
        sink.draw_end();
        self.sink = Some(sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn text_at(state: &TerminalState, y: u16) -> String {
        state
            .screen()
            .row(y)
            .iter()
            .map(|g| g.ch)
            .collect::<String>()
            .trim_end()
            .to_string()
    }

    fn put_str(state: &mut TerminalState, s: &str) {
        for ch in s.chars() {
            state.put_char(ch);
        }
    }

    #[test]
    fn put_char_advances_cursor() {
        let mut state = TerminalState::new(10, 4);
        put_str(&mut state, "abc");
        assert_eq!(text_at(&state, 0), "abc");
        assert_eq!(state.cursor(), (3, 0));
    }

    #[test]
    fn autowrap_defers_until_next_char() {
        let mut state = TerminalState::new(4, 3);
        put_str(&mut state, "abcd");
        // The cursor rests past the edge; no wrap has happened yet.
        assert_eq!(state.cursor(), (3, 0));
        state.put_char('e');
        assert_eq!(text_at(&state, 0), "abcd");
        assert_eq!(text_at(&state, 1), "e");
        assert!(state.screen().is_wrapped(0));
    }

    #[test]
    fn wide_char_occupies_pair() {
        let mut state = TerminalState::new(10, 2);
        state.put_char('漢');
        let head = state.screen().glyph(0, 0);
        let tail = state.screen().glyph(1, 0);
        assert!(head.attrs.contains(GlyphAttrs::WIDE));
        assert!(tail.attrs.contains(GlyphAttrs::WIDE_DUMMY));
        assert_eq!(state.cursor(), (2, 0));
    }

    #[test]
    fn wide_char_wraps_when_one_cell_remains() {
        let mut state = TerminalState::new(3, 2);
        put_str(&mut state, "ab");
        state.put_char('漢');
        assert_eq!(text_at(&state, 0), "ab");
        assert_eq!(state.screen().glyph(0, 1).ch, '漢');
    }

    #[test]
    fn overwriting_half_a_wide_pair_clears_partner() {
        let mut state = TerminalState::new(10, 2);
        state.put_char('漢');
        state.cursor_position(1, 2);
        state.put_char('x');
        assert_eq!(state.screen().glyph(0, 0).ch, ' ');
        assert!(!state.screen().glyph(0, 0).attrs.contains(GlyphAttrs::WIDE));
        assert_eq!(state.screen().glyph(1, 0).ch, 'x');
    }

    #[test]
    fn linefeed_scrolls_at_region_bottom() {
        let mut state = TerminalState::new(10, 3);
        put_str(&mut state, "one");
        state.carriage_return();
        state.linefeed();
        put_str(&mut state, "two");
        state.carriage_return();
        state.linefeed();
        put_str(&mut state, "three");
        state.carriage_return();
        state.linefeed();
        assert_eq!(text_at(&state, 0), "two");
        assert_eq!(text_at(&state, 1), "three");
        assert_eq!(text_at(&state, 2), "");
    }

    #[test]
    fn scroll_region_limits_scrolling() {
        let mut state = TerminalState::new(10, 4);
        for (y, s) in ["aaa", "bbb", "ccc", "ddd"].iter().enumerate() {
            state.cursor_position(y as u16 + 1, 1);
            put_str(&mut state, s);
        }
        state.set_scroll_region(2, 3);
        assert_eq!(state.cursor(), (0, 0));
        state.cursor_position(3, 1);
        state.linefeed();
        assert_eq!(text_at(&state, 0), "aaa");
        assert_eq!(text_at(&state, 1), "ccc");
        assert_eq!(text_at(&state, 2), "");
        assert_eq!(text_at(&state, 3), "ddd");
    }

    #[test]
    fn reverse_index_scrolls_down_at_top() {
        let mut state = TerminalState::new(10, 3);
        put_str(&mut state, "top");
        state.reverse_index();
        assert_eq!(text_at(&state, 0), "");
        assert_eq!(text_at(&state, 1), "top");
    }

    #[test]
    fn erase_uses_current_background() {
        let mut state = TerminalState::new(5, 2);
        put_str(&mut state, "abc");
        state.attrs.bg = Color::Indexed(4);
        state.cursor_position(1, 1);
        state.erase_in_line(2);
        let g = state.screen().glyph(0, 0);
        assert_eq!(g.ch, ' ');
        assert_eq!(g.bg, Color::Indexed(4));
    }

    #[test]
    fn insert_and_delete_chars() {
        let mut state = TerminalState::new(6, 1);
        put_str(&mut state, "abcdef");
        state.cursor_position(1, 2);
        state.insert_chars(2);
        assert_eq!(text_at(&state, 0), "a  bcd");
        state.delete_chars(2);
        assert_eq!(text_at(&state, 0), "abcd");
    }

    #[test]
    fn insert_and_delete_lines_respect_region() {
        let mut state = TerminalState::new(10, 4);
        for (y, s) in ["aaa", "bbb", "ccc", "ddd"].iter().enumerate() {
            state.cursor_position(y as u16 + 1, 1);
            put_str(&mut state, s);
        }
        state.set_scroll_region(1, 3);
        state.cursor_position(2, 1);
        state.insert_lines(1);
        assert_eq!(text_at(&state, 1), "");
        assert_eq!(text_at(&state, 2), "bbb");
        assert_eq!(text_at(&state, 3), "ddd");
        state.delete_lines(1);
        assert_eq!(text_at(&state, 1), "bbb");
        assert_eq!(text_at(&state, 2), "");
    }

    #[test]
    fn alt_screen_preserves_primary() {
        let mut state = TerminalState::new(10, 3);
        put_str(&mut state, "primary");
        state.set_private_mode(1049, true);
        assert!(state.is_alt_screen());
        assert_eq!(text_at(&state, 0), "");
        put_str(&mut state, "alt");
        state.set_private_mode(1049, false);
        assert!(!state.is_alt_screen());
        assert_eq!(text_at(&state, 0), "primary");
        assert_eq!(state.cursor(), (7, 0));
    }

    #[test]
    fn alt_screen_denied_when_disallowed() {
        let mut state = TerminalState::new(10, 3);
        state.modes.allow_alt_screen = false;
        state.set_private_mode(47, true);
        assert!(!state.is_alt_screen());
    }

    #[test]
    fn dectcem_toggles_cursor_visibility() {
        let mut state = TerminalState::new(10, 3);
        assert!(state.cursor_visible());
        state.set_private_mode(25, false);
        assert!(!state.cursor_visible());
        state.set_private_mode(25, true);
        assert!(state.cursor_visible());
    }

    #[test]
    fn reverse_video_marks_everything_dirty() {
        let record = Rc::new(RefCell::new(Recording::default()));
        let mut state = TerminalState::new(10, 3);
        state.attach_sink(Box::new(RecordingSink(record)));
        state.draw();
        state.set_private_mode(5, true);
        for y in 0..3 {
            assert!(state.screen().is_dirty(y));
        }
        assert!(state.win_mode().contains(WinMode::REVERSE));
    }

    #[test]
    fn focus_report_only_when_enabled() {
        let mut state = TerminalState::new(10, 3);
        state.set_focus(false);
        assert_eq!(state.take_focus_report(), None);
        state.set_private_mode(1004, true);
        state.set_focus(true);
        assert_eq!(state.take_focus_report(), Some(&b"\x1b[I"[..]));
        assert_eq!(state.take_focus_report(), None);
    }

    #[test]
    fn resize_preserves_overlap_and_pads_hidden() {
        let mut state = TerminalState::new(6, 3);
        put_str(&mut state, "hello");
        state.resize(8, 2);
        assert_eq!(text_at(&state, 0), "hello");
        assert!(state
            .screen()
            .glyph(7, 0)
            .attrs
            .contains(GlyphAttrs::INVISIBLE));
        assert_eq!(state.screen().rows(), 2);
        assert_eq!(state.scroll_region(), (0, 1));
    }

    #[test]
    fn resize_clamps_cursor() {
        let mut state = TerminalState::new(20, 10);
        state.cursor_position(10, 20);
        state.resize(5, 4);
        assert_eq!(state.cursor(), (4, 3));
    }

    #[test]
    fn selection_text_follows_reading_order() {
        let mut state = TerminalState::new(10, 3);
        put_str(&mut state, "hello");
        state.cursor_position(2, 1);
        put_str(&mut state, "world");
        // Dragged upward; the text still reads top-down.
        state.selection_start(4, 1, SelectionMode::Regular, SelectionSnap::None);
        state.selection_extend(1, 0, SelectionMode::Regular, SelectionSnap::None);
        assert_eq!(state.selection_text().as_deref(), Some("ello\nworld"));
    }

    #[test]
    fn selection_joins_wrapped_rows() {
        let mut state = TerminalState::new(4, 3);
        put_str(&mut state, "abcdef");
        state.selection_start(0, 0, SelectionMode::Regular, SelectionSnap::None);
        state.selection_extend(1, 1, SelectionMode::Regular, SelectionSnap::None);
        assert_eq!(state.selection_text().as_deref(), Some("abcdef"));
    }

    #[test]
    fn rectangular_selection_is_column_bound() {
        let mut state = TerminalState::new(10, 3);
        put_str(&mut state, "abcde");
        state.cursor_position(2, 1);
        put_str(&mut state, "fghij");
        state.selection_start(1, 0, SelectionMode::Rectangular, SelectionSnap::None);
        state.selection_extend(3, 1, SelectionMode::Rectangular, SelectionSnap::None);
        assert_eq!(state.selection_text().as_deref(), Some("bcd\nghi"));
        assert!(state.is_selected(2, 0));
        assert!(!state.is_selected(4, 0));
    }

    #[test]
    fn word_snap_expands_to_blanks() {
        let mut state = TerminalState::new(20, 2);
        put_str(&mut state, "foo barbaz qux");
        state.selection_start(6, 0, SelectionMode::Regular, SelectionSnap::Word);
        assert_eq!(state.selection_text().as_deref(), Some("barbaz"));
    }

    #[test]
    fn line_snap_covers_full_rows() {
        let mut state = TerminalState::new(10, 2);
        put_str(&mut state, "full line");
        state.selection_start(4, 0, SelectionMode::Regular, SelectionSnap::Line);
        assert_eq!(state.selection_text().as_deref(), Some("full line"));
    }

    #[test]
    fn selection_cleared_when_resized_away() {
        let mut state = TerminalState::new(20, 10);
        state.selection_start(15, 8, SelectionMode::Regular, SelectionSnap::None);
        state.selection_extend(18, 9, SelectionMode::Regular, SelectionSnap::None);
        state.resize(10, 5);
        assert!(!state.has_selection());
        assert!(state.selection_text().is_none());
    }

    #[test]
    fn selection_clamped_when_partially_visible() {
        let mut state = TerminalState::new(20, 10);
        put_str(&mut state, "keep");
        state.selection_start(0, 0, SelectionMode::Regular, SelectionSnap::None);
        state.selection_extend(19, 9, SelectionMode::Regular, SelectionSnap::None);
        state.resize(10, 5);
        assert!(state.has_selection());
    }

    #[test]
    fn scrolling_moves_selection_with_content() {
        let mut state = TerminalState::new(10, 4);
        state.cursor_position(3, 1);
        put_str(&mut state, "pick");
        state.selection_start(0, 2, SelectionMode::Regular, SelectionSnap::None);
        state.selection_extend(3, 2, SelectionMode::Regular, SelectionSnap::None);
        state.scroll_up(0, 1);
        assert_eq!(state.selection_text().as_deref(), Some("pick"));
    }

    #[test]
    fn scrolling_past_region_clears_selection() {
        let mut state = TerminalState::new(10, 4);
        state.selection_start(0, 0, SelectionMode::Regular, SelectionSnap::None);
        state.scroll_up(0, 2);
        assert!(!state.has_selection());
    }

    #[derive(Default)]
    struct Recording {
        lines: Vec<(u16, String)>,
        cursor: Option<(u16, u16)>,
        begun: u32,
        ended: u32,
        title: Option<String>,
    }

    struct RecordingSink(Rc<RefCell<Recording>>);

    impl DisplaySink for RecordingSink {
        fn draw_begin(&mut self, _columns: u16, _rows: u16) -> bool {
            self.0.borrow_mut().begun += 1;
            true
        }
        fn draw_line(&mut self, line: &[Glyph], x_start: u16, y: u16, x_end: u16) {
            let text: String = line[x_start as usize..x_end as usize]
                .iter()
                .map(|g| g.ch)
                .collect();
            self.0.borrow_mut().lines.push((y, text));
        }
        fn draw_cursor(&mut self, x: u16, y: u16, _glyph: &Glyph) {
            self.0.borrow_mut().cursor = Some((x, y));
        }
        fn draw_end(&mut self) {
            self.0.borrow_mut().ended += 1;
        }
        fn set_title(&mut self, title: &str) {
            self.0.borrow_mut().title = Some(title.to_string());
        }
    }

    #[test]
    fn draw_emits_dirty_rows_then_cursor() {
        let record = Rc::new(RefCell::new(Recording::default()));
        let mut state = TerminalState::new(5, 2);
        state.attach_sink(Box::new(RecordingSink(record.clone())));
        put_str(&mut state, "hi");
        state.draw();
        {
            let r = record.borrow();
            assert_eq!(r.begun, 1);
            assert_eq!(r.ended, 1);
            assert_eq!(r.lines.len(), 2);
            assert_eq!(r.lines[0].1.trim_end(), "hi");
            assert_eq!(r.cursor, Some((2, 0)));
        }
        record.borrow_mut().lines.clear();
        // A second draw with nothing changed pushes no rows.
        state.draw();
        assert!(record.borrow().lines.is_empty());
    }

    #[test]
    fn title_reaches_sink() {
        let record = Rc::new(RefCell::new(Recording::default()));
        let mut state = TerminalState::new(5, 2);
        state.attach_sink(Box::new(RecordingSink(record.clone())));
        state.set_title("shell");
        assert_eq!(state.title(), "shell");
        assert_eq!(record.borrow().title.as_deref(), Some("shell"));
        let _ = state.detach_sink();
        assert!(!state.has_sink());
    }

    #[test]
    #[should_panic(expected = "already attached")]
    fn double_attach_panics() {
        let record = Rc::new(RefCell::new(Recording::default()));
        let mut state = TerminalState::new(5, 2);
        state.attach_sink(Box::new(RecordingSink(record.clone())));
        state.attach_sink(Box::new(RecordingSink(record)));
    }

    #[test]
    fn reset_returns_to_power_on() {
        let mut state = TerminalState::new(10, 4);
        put_str(&mut state, "junk");
        state.attrs.flags.insert(GlyphAttrs::BOLD);
        state.set_scroll_region(2, 3);
        state.set_private_mode(1049, true);
        state.reset();
        assert!(!state.is_alt_screen());
        assert_eq!(text_at(&state, 0), "");
        assert_eq!(state.attrs, CellAttrs::default());
        assert_eq!(state.scroll_region(), (0, 3));
    }
}
