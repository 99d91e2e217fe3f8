//! VT sequence parser
//!
//! Streaming ANSI/VT escape-sequence state machine. Bytes go in via
//! [`VtParser::advance`], mutations land on a [`TerminalState`], and
//! anything the terminal owes the child (cursor reports, device
//! attributes) comes back as [`Response`] values.
//!
//! Input may be split at arbitrary byte boundaries; escape sequences and
//! multi-byte UTF-8 characters carry over between calls.

use super::state::{CursorShape, GlyphAttrs, TerminalState};
use super::Color;

/// Response that needs to be sent back to the pty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Cursor position report: ESC [ row ; col R
    CursorPosition(u16, u16),
    /// Primary device attributes response
    DeviceAttributes,
    /// Secondary device attributes response
    SecondaryDeviceAttributes,
    /// OSC 52 clipboard query answer: ESC ] 52 ; c ; base64 ESC \
    Clipboard(String),
}

impl Response {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Response::CursorPosition(row, col) => {
                format!("\x1b[{};{}R", row, col).into_bytes()
            }
            Response::DeviceAttributes => {
                // VT220
                b"\x1b[?62;c".to_vec()
            }
            Response::SecondaryDeviceAttributes => b"\x1b[>1;10;0c".to_vec(),
            Response::Clipboard(text) => {
                format!("\x1b]52;c;{}\x1b\\", base64_encode(text.as_bytes())).into_bytes()
            }
        }
    }
}

#[derive(Clone, Copy, Default, PartialEq)]
enum ParserState {
    #[default]
    Ground,
    Escape,
    EscapeIntermediate,
    CsiEntry,
    CsiParam,
    CsiIntermediate,
    OscString,
    DcsString,
    /// ESC seen inside an OSC/DCS payload, waiting for the ST backslash.
    EscapeInString,
}

#[derive(Clone, Copy, PartialEq)]
enum StringKind {
    Osc,
    /// DCS/SOS/PM/APC payloads are consumed and discarded.
    Discard,
}

// A misbehaving child must not grow memory inside one unterminated
// sequence; excess parameters, intermediates, and payload bytes are
// consumed and dropped.
const MAX_PARAMS: usize = 16;
const MAX_INTERMEDIATES: usize = 4;
const MAX_STRING_BYTES: usize = 4096;

/// Parser state machine.
pub struct VtParser {
    state: ParserState,
    params: Vec<u16>,
    intermediates: Vec<u8>,
    current_param: Option<u16>,
    string_buf: Vec<u8>,
    string_kind: StringKind,
    utf8: [u8; 4],
    utf8_len: u8,
    utf8_need: u8,
}

impl Default for VtParser {
    fn default() -> Self {
        Self::new()
    }
}

impl VtParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Ground,
            params: Vec::with_capacity(MAX_PARAMS),
            intermediates: Vec::with_capacity(MAX_INTERMEDIATES),
            current_param: None,
            string_buf: Vec::new(),
            string_kind: StringKind::Discard,
            utf8: [0; 4],
            utf8_len: 0,
            utf8_need: 0,
        }
    }

    /// Feed a chunk of child output, collecting any owed responses.
    pub fn advance(
        &mut self,
        state: &mut TerminalState,
        bytes: &[u8],
        responses: &mut Vec<Response>,
    ) {
        for &byte in bytes {
            if let Some(response) = self.feed(byte, state) {
                responses.push(response);
            }
        }
    }

    /// Feed a single byte.
    fn feed(&mut self, byte: u8, state: &mut TerminalState) -> Option<Response> {
        // A pending multi-byte character swallows continuation bytes before
        // anything else; any other byte aborts it with a replacement.
        if self.utf8_need > 0 {
            if (0x80..=0xBF).contains(&byte) {
                self.utf8[self.utf8_len as usize] = byte;
                self.utf8_len += 1;
                if self.utf8_len == self.utf8_need {
                    match std::str::from_utf8(&self.utf8[..self.utf8_len as usize]) {
                        Ok(s) => {
                            for ch in s.chars() {
                                state.put_char(ch);
                            }
                        }
                        Err(_) => state.put_char('\u{FFFD}'),
                    }
                    self.utf8_need = 0;
                    self.utf8_len = 0;
                }
                return None;
            }
            state.put_char('\u{FFFD}');
            self.utf8_need = 0;
            self.utf8_len = 0;
        }

        // C0 controls act from any state except inside string payloads.
        let in_string = matches!(
            self.state,
            ParserState::OscString | ParserState::DcsString | ParserState::EscapeInString
        );
        if byte < 0x20 && !in_string {
            match byte {
                0x1B => self.enter_escape(),
                0x07 => state.bell(),
                0x08 => state.backspace(),
                0x09 => state.put_tab(1),
                0x0A | 0x0B | 0x0C => state.linefeed(),
                0x0D => state.carriage_return(),
                _ => {}
            }
            return None;
        }

        match self.state {
            ParserState::Ground => {
                self.ground(byte, state);
                None
            }
            ParserState::Escape => {
                self.escape(byte, state);
                None
            }
            ParserState::EscapeIntermediate => {
                self.escape_intermediate(byte);
                None
            }
            ParserState::CsiEntry => self.csi_entry(byte, state),
            ParserState::CsiParam => self.csi_param(byte, state),
            ParserState::CsiIntermediate => self.csi_intermediate(byte, state),
            ParserState::OscString | ParserState::DcsString => self.string_byte(byte, state),
            ParserState::EscapeInString => self.escape_in_string(byte, state),
        }
    }

    fn enter_escape(&mut self) {
        self.state = ParserState::Escape;
        self.params.clear();
        self.intermediates.clear();
        self.current_param = None;
    }

    fn enter_string(&mut self, kind: StringKind) {
        self.state = match kind {
            StringKind::Osc => ParserState::OscString,
            StringKind::Discard => ParserState::DcsString,
        };
        self.string_kind = kind;
        self.string_buf.clear();
    }

    fn push_param(&mut self, value: u16) {
        if self.params.len() < MAX_PARAMS {
            self.params.push(value);
        }
    }

    fn push_intermediate(&mut self, byte: u8) {
        if self.intermediates.len() < MAX_INTERMEDIATES {
            self.intermediates.push(byte);
        }
    }

    fn ground(&mut self, byte: u8, state: &mut TerminalState) {
        match byte {
            0x20..=0x7E => state.put_char(byte as char),
            0xC2..=0xDF => self.start_utf8(byte, 2),
            0xE0..=0xEF => self.start_utf8(byte, 3),
            0xF0..=0xF4 => self.start_utf8(byte, 4),
            0x7F => {}
            // Stray continuation or invalid lead byte.
            _ => state.put_char('\u{FFFD}'),
        }
    }

    fn start_utf8(&mut self, lead: u8, need: u8) {
        self.utf8[0] = lead;
        self.utf8_len = 1;
        self.utf8_need = need;
    }

    fn escape(&mut self, byte: u8, state: &mut TerminalState) {
        match byte {
            b'[' => {
                self.state = ParserState::CsiEntry;
                self.params.clear();
                self.intermediates.clear();
                self.current_param = None;
            }
            b']' => self.enter_string(StringKind::Osc),
            b'P' | b'X' | b'^' | b'_' => self.enter_string(StringKind::Discard),
            b'7' => {
                // DECSC
                state.save_cursor();
                self.state = ParserState::Ground;
            }
            b'8' => {
                // DECRC
                state.restore_cursor();
                self.state = ParserState::Ground;
            }
            b'D' => {
                // IND
                state.linefeed();
                self.state = ParserState::Ground;
            }
            b'E' => {
                // NEL
                state.carriage_return();
                state.linefeed();
                self.state = ParserState::Ground;
            }
            b'M' => {
                // RI
                state.reverse_index();
                self.state = ParserState::Ground;
            }
            b'c' => {
                // RIS
                state.reset();
                self.state = ParserState::Ground;
            }
            0x20..=0x2F => {
                self.push_intermediate(byte);
                self.state = ParserState::EscapeIntermediate;
            }
            _ => {
                // DECKPAM/DECKPNM and friends have no screen effect here.
                self.state = ParserState::Ground;
            }
        }
    }

    fn escape_intermediate(&mut self, byte: u8) {
        match byte {
            0x20..=0x2F => self.push_intermediate(byte),
            // Final byte; charset selections are accepted and ignored.
            _ => self.state = ParserState::Ground,
        }
    }

    fn csi_entry(&mut self, byte: u8, state: &mut TerminalState) -> Option<Response> {
        match byte {
            b'0'..=b'9' => {
                self.current_param = Some((byte - b'0') as u16);
                self.state = ParserState::CsiParam;
            }
            b';' => {
                self.push_param(0);
                self.state = ParserState::CsiParam;
            }
            b'?' | b'>' | b'!' | b'=' => self.push_intermediate(byte),
            0x20..=0x2F => {
                self.push_intermediate(byte);
                self.state = ParserState::CsiIntermediate;
            }
            0x40..=0x7E => return self.execute_csi(byte, state),
            _ => self.state = ParserState::Ground,
        }
        None
    }

    fn csi_param(&mut self, byte: u8, state: &mut TerminalState) -> Option<Response> {
        match byte {
            b'0'..=b'9' => {
                let digit = (byte - b'0') as u16;
                self.current_param = Some(
                    self.current_param
                        .unwrap_or(0)
                        .saturating_mul(10)
                        .saturating_add(digit),
                );
            }
            // Subparameter colons are flattened into the parameter list.
            b';' | b':' => {
                let p = self.current_param.take().unwrap_or(0);
                self.push_param(p);
            }
            0x20..=0x2F => {
                if let Some(p) = self.current_param.take() {
                    self.push_param(p);
                }
                self.push_intermediate(byte);
                self.state = ParserState::CsiIntermediate;
            }
            0x40..=0x7E => {
                if let Some(p) = self.current_param.take() {
                    self.push_param(p);
                }
                return self.execute_csi(byte, state);
            }
            _ => self.state = ParserState::Ground,
        }
        None
    }

    fn csi_intermediate(&mut self, byte: u8, state: &mut TerminalState) -> Option<Response> {
        match byte {
            0x20..=0x2F => {
                self.push_intermediate(byte);
                None
            }
            0x40..=0x7E => self.execute_csi(byte, state),
            _ => {
                self.state = ParserState::Ground;
                None
            }
        }
    }

    fn string_byte(&mut self, byte: u8, state: &mut TerminalState) -> Option<Response> {
        match byte {
            // BEL terminates OSC the xterm way.
            0x07 if self.string_kind == StringKind::Osc => {
                let response = self.execute_string(state);
                self.state = ParserState::Ground;
                response
            }
            0x1B => {
                self.state = ParserState::EscapeInString;
                None
            }
            // 8-bit ST
            0x9C => {
                let response = self.execute_string(state);
                self.state = ParserState::Ground;
                response
            }
            _ => {
                if self.string_buf.len() < MAX_STRING_BYTES {
                    self.string_buf.push(byte);
                }
                None
            }
        }
    }

    fn escape_in_string(&mut self, byte: u8, state: &mut TerminalState) -> Option<Response> {
        if byte == b'\\' {
            // ST (ESC \)
            let response = self.execute_string(state);
            self.state = ParserState::Ground;
            response
        } else {
            // Not ST: the string is over, and this byte begins a new
            // escape sequence.
            let response = self.execute_string(state);
            self.enter_escape();
            self.escape(byte, state);
            response
        }
    }

    fn execute_string(&mut self, state: &mut TerminalState) -> Option<Response> {
        match self.string_kind {
            StringKind::Osc => self.execute_osc(state),
            StringKind::Discard => {
                tracing::trace!("discarded {}-byte control string", self.string_buf.len());
                self.string_buf.clear();
                None
            }
        }
    }

    fn param(&self, index: usize, default: u16) -> u16 {
        self.params.get(index).copied().unwrap_or(default)
    }

    fn execute_csi(&mut self, final_byte: u8, state: &mut TerminalState) -> Option<Response> {
        let is_private = self.intermediates.contains(&b'?');
        let is_gt = self.intermediates.contains(&b'>');

        let response = match (is_private, is_gt, final_byte) {
            // Cursor movement
            (false, false, b'A') => {
                state.cursor_up(self.param(0, 1));
                None
            }
            (false, false, b'B') => {
                state.cursor_down(self.param(0, 1));
                None
            }
            (false, false, b'C') => {
                state.cursor_forward(self.param(0, 1));
                None
            }
            (false, false, b'D') => {
                state.cursor_backward(self.param(0, 1));
                None
            }
            (false, false, b'E') => {
                // CNL
                state.cursor_down(self.param(0, 1));
                state.carriage_return();
                None
            }
            (false, false, b'F') => {
                // CPL
                state.cursor_up(self.param(0, 1));
                state.carriage_return();
                None
            }
            (false, false, b'G') => {
                // CHA
                state.cursor_to_column(self.param(0, 1));
                None
            }
            (false, false, b'H') | (false, false, b'f') => {
                // CUP
                state.cursor_position(self.param(0, 1), self.param(1, 1));
                None
            }
            (false, false, b'd') => {
                // VPA
                state.cursor_to_row(self.param(0, 1));
                None
            }
            (false, false, b'I') => {
                // CHT
                state.put_tab(self.param(0, 1).max(1) as i32);
                None
            }
            (false, false, b'Z') => {
                // CBT
                state.put_tab(-(self.param(0, 1).max(1) as i32));
                None
            }

            // Erase
            (false, false, b'J') => {
                state.erase_in_display(self.param(0, 0));
                None
            }
            (false, false, b'K') => {
                state.erase_in_line(self.param(0, 0));
                None
            }

            // Line operations
            (false, false, b'L') => {
                state.insert_lines(self.param(0, 1));
                None
            }
            (false, false, b'M') => {
                state.delete_lines(self.param(0, 1));
                None
            }

            // Character operations
            (false, false, b'@') => {
                state.insert_chars(self.param(0, 1));
                None
            }
            (false, false, b'P') => {
                state.delete_chars(self.param(0, 1));
                None
            }
            (false, false, b'X') => {
                state.erase_chars(self.param(0, 1));
                None
            }

            // Scroll
            (false, false, b'S') => {
                let origin = state.scroll_region().0;
                state.scroll_up(origin, self.param(0, 1));
                None
            }
            (false, false, b'T') => {
                let origin = state.scroll_region().0;
                state.scroll_down(origin, self.param(0, 1));
                None
            }

            // DECSTBM
            (false, false, b'r') => {
                state.set_scroll_region(self.param(0, 1), self.param(1, 0));
                None
            }

            // SGR
            (false, false, b'm') => {
                self.execute_sgr(state);
                None
            }

            (false, false, b's') => {
                state.save_cursor();
                None
            }
            (false, false, b'u') => {
                state.restore_cursor();
                None
            }

            // DSR
            (false, false, b'n') => match self.param(0, 0) {
                6 => {
                    let (x, y) = state.cursor();
                    Some(Response::CursorPosition(y + 1, x + 1))
                }
                other => {
                    tracing::debug!("unhandled DSR {}", other);
                    None
                }
            },

            // Device attributes
            (false, false, b'c') => Some(Response::DeviceAttributes),
            (false, true, b'c') => Some(Response::SecondaryDeviceAttributes),

            // DEC private modes
            (true, false, b'h') => {
                for i in 0..self.params.len() {
                    state.set_private_mode(self.params[i], true);
                }
                None
            }
            (true, false, b'l') => {
                for i in 0..self.params.len() {
                    state.set_private_mode(self.params[i], false);
                }
                None
            }

            // ANSI modes
            (false, false, b'h') => {
                for i in 0..self.params.len() {
                    state.set_mode(self.params[i], true);
                }
                None
            }
            (false, false, b'l') => {
                for i in 0..self.params.len() {
                    state.set_mode(self.params[i], false);
                }
                None
            }

            // DECSCUSR: CSI Ps SP q
            (false, false, b'q') if self.intermediates.contains(&b' ') => {
                state.set_cursor_shape(CursorShape::from_decscusr(self.param(0, 0) as u8));
                None
            }

            _ => {
                tracing::debug!(
                    "unknown CSI: intermediates={:?}, params={:?}, final={:?}",
                    self.intermediates,
                    self.params,
                    final_byte as char
                );
                None
            }
        };

        self.state = ParserState::Ground;
        response
    }

    fn execute_sgr(&self, state: &mut TerminalState) {
        if self.params.is_empty() {
            state.attrs = Default::default();
            return;
        }

        let mut iter = self.params.iter();
        while let Some(&param) = iter.next() {
            match param {
                0 => state.attrs = Default::default(),
                1 => state.attrs.flags |= GlyphAttrs::BOLD,
                2 => state.attrs.flags |= GlyphAttrs::FAINT,
                3 => state.attrs.flags |= GlyphAttrs::ITALIC,
                4 => state.attrs.flags |= GlyphAttrs::UNDERLINE,
                5 | 6 => state.attrs.flags |= GlyphAttrs::BLINK,
                7 => state.attrs.flags |= GlyphAttrs::REVERSE,
                8 => state.attrs.flags |= GlyphAttrs::INVISIBLE,
                9 => state.attrs.flags |= GlyphAttrs::STRUCK,

                22 => state.attrs.flags &= !(GlyphAttrs::BOLD | GlyphAttrs::FAINT),
                23 => state.attrs.flags &= !GlyphAttrs::ITALIC,
                24 => state.attrs.flags &= !GlyphAttrs::UNDERLINE,
                25 => state.attrs.flags &= !GlyphAttrs::BLINK,
                27 => state.attrs.flags &= !GlyphAttrs::REVERSE,
                28 => state.attrs.flags &= !GlyphAttrs::INVISIBLE,
                29 => state.attrs.flags &= !GlyphAttrs::STRUCK,

                30..=37 => state.attrs.fg = Color::Indexed((param - 30) as u8),
                38 => {
                    if let Some(color) = Self::extended_color(&mut iter) {
                        state.attrs.fg = color;
                    }
                }
                39 => state.attrs.fg = Color::Default,

                40..=47 => state.attrs.bg = Color::Indexed((param - 40) as u8),
                48 => {
                    if let Some(color) = Self::extended_color(&mut iter) {
                        state.attrs.bg = color;
                    }
                }
                49 => state.attrs.bg = Color::Default,

                90..=97 => state.attrs.fg = Color::Indexed((param - 90 + 8) as u8),
                100..=107 => state.attrs.bg = Color::Indexed((param - 100 + 8) as u8),

                other => tracing::debug!("unhandled SGR {}", other),
            }
        }
    }

    /// SGR 38/48 extended color: `5;n` indexed or `2;r;g;b` truecolor.
    fn extended_color<'a, I: Iterator<Item = &'a u16>>(iter: &mut I) -> Option<Color> {
        match iter.next().copied() {
            Some(5) => Some(Color::Indexed(*iter.next()? as u8)),
            Some(2) => {
                let r = *iter.next()? as u8;
                let g = *iter.next()? as u8;
                let b = *iter.next()? as u8;
                Some(Color::Rgb(r, g, b))
            }
            _ => None,
        }
    }

    fn execute_osc(&mut self, state: &mut TerminalState) -> Option<Response> {
        let raw = std::mem::take(&mut self.string_buf);
        let text = String::from_utf8_lossy(&raw);
        let (code, rest) = match text.split_once(';') {
            Some((code, rest)) => (code, rest),
            None => (text.as_ref(), ""),
        };

        match code {
            "0" => {
                state.set_icon_title(rest);
                state.set_title(rest);
            }
            "1" => state.set_icon_title(rest),
            "2" => state.set_title(rest),
            "4" => {
                let mut parts = rest.split(';');
                while let (Some(index), Some(name)) = (parts.next(), parts.next()) {
                    match index.parse::<u8>() {
                        Ok(i) if name != "?" => state.set_color_name(i, name),
                        _ => tracing::debug!("unhandled OSC 4 argument {};{}", index, name),
                    }
                }
            }
            "52" => {
                // "c;<base64>": a "?" payload queries the clipboard, anything
                // else lands on it.
                if let Some((_, payload)) = rest.split_once(';') {
                    if payload == "?" {
                        return Some(Response::Clipboard(state.clipboard_contents()));
                    }
                    match base64_decode(payload) {
                        Some(bytes) => state.set_clipboard(&String::from_utf8_lossy(&bytes)),
                        None => tracing::debug!("malformed OSC 52 payload"),
                    }
                }
            }
            "104" => {
                if rest.is_empty() {
                    state.reset_colors();
                } else {
                    for part in rest.split(';') {
                        if let Ok(i) = part.parse::<u8>() {
                            state.reset_color(i);
                        }
                    }
                }
            }
            _ => tracing::debug!("unhandled OSC {}", code),
        }
        None
    }
}

const BASE64_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Encode standard base64 with padding.
fn base64_encode(input: &[u8]) -> String {
    let mut out = String::with_capacity((input.len() + 2) / 3 * 4);
    for chunk in input.chunks(3) {
        let n = (u32::from(chunk[0]) << 16)
            | (u32::from(chunk.get(1).copied().unwrap_or(0)) << 8)
            | u32::from(chunk.get(2).copied().unwrap_or(0));
        out.push(BASE64_ALPHABET[(n >> 18) as usize & 63] as char);
        out.push(BASE64_ALPHABET[(n >> 12) as usize & 63] as char);
        out.push(if chunk.len() > 1 {
            BASE64_ALPHABET[(n >> 6) as usize & 63] as char
        } else {
            '='
        });
        out.push(if chunk.len() > 2 {
            BASE64_ALPHABET[n as usize & 63] as char
        } else {
            '='
        });
    }
    out
}

/// Decode standard base64, tolerating embedded line breaks. Returns `None`
/// on any other non-alphabet byte.
fn base64_decode(input: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() / 4 * 3);
    let mut acc: u32 = 0;
    let mut bits = 0u32;
    for byte in input.bytes() {
        let value = match byte {
            b'A'..=b'Z' => byte - b'A',
            b'a'..=b'z' => byte - b'a' + 26,
            b'0'..=b'9' => byte - b'0' + 52,
            b'+' => 62,
            b'/' => 63,
            b'=' => break,
            b'\r' | b'\n' => continue,
            _ => return None,
        };
        acc = (acc << 6) | value as u32;
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            out.push((acc >> bits) as u8);
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::DisplaySink;
    use crate::term::state::{Glyph, SelectionMode, SelectionSnap, WinMode};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn feed(parser: &mut VtParser, state: &mut TerminalState, bytes: &[u8]) -> Vec<Response> {
        let mut responses = Vec::new();
        parser.advance(state, bytes, &mut responses);
        responses
    }

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

    #[test]
    fn cursor_movement() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();
        feed(&mut parser, &mut state, b"\x1b[5;10H");
        assert_eq!(state.cursor(), (9, 4));
    }

    #[test]
    fn sgr_colors_and_reset() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();
        feed(&mut parser, &mut state, b"Hi\x1b[31mRed\x1b[0m!");
        assert_eq!(text_at(&state, 0), "HiRed!");
        assert_eq!(state.screen().glyph(0, 0).fg, Color::Default);
        assert_eq!(state.screen().glyph(2, 0).fg, Color::Indexed(1));
        assert_eq!(state.screen().glyph(5, 0).fg, Color::Default);
    }

    #[test]
    fn sgr_extended_colors() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();
        feed(&mut parser, &mut state, b"\x1b[38;5;196m\x1b[48;2;1;2;3mx");
        let g = state.screen().glyph(0, 0);
        assert_eq!(g.fg, Color::Indexed(196));
        assert_eq!(g.bg, Color::Rgb(1, 2, 3));
    }

    #[test]
    fn sgr_attribute_set_and_clear() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();
        feed(&mut parser, &mut state, b"\x1b[1;4;9m");
        assert!(state.attrs.flags.contains(GlyphAttrs::BOLD));
        assert!(state.attrs.flags.contains(GlyphAttrs::UNDERLINE));
        assert!(state.attrs.flags.contains(GlyphAttrs::STRUCK));
        feed(&mut parser, &mut state, b"\x1b[22;24m");
        assert!(!state.attrs.flags.contains(GlyphAttrs::BOLD));
        assert!(!state.attrs.flags.contains(GlyphAttrs::UNDERLINE));
        assert!(state.attrs.flags.contains(GlyphAttrs::STRUCK));
    }

    #[test]
    fn sequences_survive_arbitrary_chunking() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();
        let input = b"\x1b[2;2HAB\x1b[31mC";
        for chunk in input.chunks(1) {
            feed(&mut parser, &mut state, chunk);
        }
        assert_eq!(text_at(&state, 1), " ABC");
        assert_eq!(state.screen().glyph(3, 1).fg, Color::Indexed(1));
    }

    #[test]
    fn utf8_split_across_feeds() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();
        let bytes = "héllo".as_bytes();
        feed(&mut parser, &mut state, &bytes[..2]);
        feed(&mut parser, &mut state, &bytes[2..]);
        assert_eq!(text_at(&state, 0), "héllo");
    }

    #[test]
    fn malformed_utf8_yields_replacement() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();
        // Lead byte followed by a plain ASCII byte.
        feed(&mut parser, &mut state, b"\xC3x");
        assert_eq!(text_at(&state, 0), "\u{FFFD}x");
    }

    #[test]
    fn clear_screen_and_home() {
        let mut state = TerminalState::new(20, 5);
        let mut parser = VtParser::new();
        feed(&mut parser, &mut state, b"some junk text");
        feed(&mut parser, &mut state, b"\x1b[2J\x1b[H");
        for y in 0..5 {
            assert_eq!(text_at(&state, y), "");
        }
        assert_eq!(state.cursor(), (0, 0));
    }

    #[test]
    fn osc_title_with_bel_and_st() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();
        feed(&mut parser, &mut state, b"\x1b]2;bel title\x07");
        assert_eq!(state.title(), "bel title");
        feed(&mut parser, &mut state, b"\x1b]0;st title\x1b\\after");
        assert_eq!(state.title(), "st title");
        assert_eq!(state.icon_title(), "st title");
        assert_eq!(text_at(&state, 0), "after");
    }

    #[test]
    fn osc_interrupted_by_new_escape() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();
        // ESC not followed by backslash ends the OSC and starts a CSI.
        feed(&mut parser, &mut state, b"\x1b]2;partial\x1b[31mx");
        assert_eq!(state.title(), "partial");
        assert_eq!(state.screen().glyph(0, 0).fg, Color::Indexed(1));
    }

    #[test]
    fn dsr_reports_cursor_position() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();
        feed(&mut parser, &mut state, b"\x1b[3;7H");
        let responses = feed(&mut parser, &mut state, b"\x1b[6n");
        assert_eq!(responses, vec![Response::CursorPosition(3, 7)]);
        assert_eq!(responses[0].to_bytes(), b"\x1b[3;7R");
    }

    #[test]
    fn device_attributes() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();
        assert_eq!(
            feed(&mut parser, &mut state, b"\x1b[c"),
            vec![Response::DeviceAttributes]
        );
        assert_eq!(
            feed(&mut parser, &mut state, b"\x1b[>c"),
            vec![Response::SecondaryDeviceAttributes]
        );
    }

    #[test]
    fn private_modes_toggle() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();
        feed(&mut parser, &mut state, b"\x1b[?2004h\x1b[?25l");
        assert!(state.modes.bracketed_paste);
        assert!(!state.cursor_visible());
        feed(&mut parser, &mut state, b"\x1b[?2004l\x1b[?25h");
        assert!(!state.modes.bracketed_paste);
        assert!(state.cursor_visible());
    }

    #[test]
    fn alt_screen_via_parser() {
        let mut state = TerminalState::new(20, 5);
        let mut parser = VtParser::new();
        feed(&mut parser, &mut state, b"primary");
        feed(&mut parser, &mut state, b"\x1b[?1049h");
        assert!(state.is_alt_screen());
        feed(&mut parser, &mut state, b"alt");
        feed(&mut parser, &mut state, b"\x1b[?1049l");
        assert_eq!(text_at(&state, 0), "primary");
    }

    #[test]
    fn decstbm_and_line_ops() {
        let mut state = TerminalState::new(20, 4);
        let mut parser = VtParser::new();
        feed(&mut parser, &mut state, b"a\r\nb\r\nc\r\nd");
        feed(&mut parser, &mut state, b"\x1b[2;3r\x1b[2;1H\x1b[L");
        assert_eq!(text_at(&state, 0), "a");
        assert_eq!(text_at(&state, 1), "");
        assert_eq!(text_at(&state, 2), "b");
        assert_eq!(text_at(&state, 3), "d");
    }

    #[test]
    fn decscusr_sets_shape() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();
        feed(&mut parser, &mut state, b"\x1b[4 q");
        assert_eq!(state.cursor_shape(), CursorShape::SteadyUnderline);
    }

    #[test]
    fn ris_resets_state() {
        let mut state = TerminalState::new(20, 5);
        let mut parser = VtParser::new();
        feed(&mut parser, &mut state, b"\x1b[31mjunk\x1bc");
        assert_eq!(text_at(&state, 0), "");
        assert_eq!(state.attrs.fg, Color::Default);
    }

    #[test]
    fn dcs_is_consumed_silently() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();
        feed(&mut parser, &mut state, b"\x1bP1$tpayload\x1b\\visible");
        assert_eq!(text_at(&state, 0), "visible");
    }

    #[test]
    fn wide_chars_through_parser() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();
        feed(&mut parser, &mut state, "日本語".as_bytes());
        assert_eq!(state.cursor(), (6, 0));
        assert!(state
            .screen()
            .glyph(1, 0)
            .attrs
            .contains(GlyphAttrs::WIDE_DUMMY));
    }

    #[derive(Default)]
    struct ClipboardRecord {
        clipboard: Option<String>,
        reset_slots: Vec<(u8, Option<String>)>,
        reset_all: bool,
        bells: u32,
    }

    struct ClipboardSink(Rc<RefCell<ClipboardRecord>>);

    impl DisplaySink for ClipboardSink {
        fn draw_begin(&mut self, _columns: u16, _rows: u16) -> bool {
            true
        }
        fn draw_line(&mut self, _line: &[Glyph], _x_start: u16, _y: u16, _x_end: u16) {}
        fn draw_cursor(&mut self, _x: u16, _y: u16, _glyph: &Glyph) {}
        fn draw_end(&mut self) {}
        fn bell(&mut self) {
            self.0.borrow_mut().bells += 1;
        }
        fn set_clipboard(&mut self, text: &str) {
            self.0.borrow_mut().clipboard = Some(text.to_string());
        }
        fn get_clipboard(&mut self) -> String {
            self.0.borrow().clipboard.clone().unwrap_or_default()
        }
        fn reset_colors(&mut self) {
            self.0.borrow_mut().reset_all = true;
        }
        fn reset_color(&mut self, index: u8, name: Option<&str>) {
            self.0
                .borrow_mut()
                .reset_slots
                .push((index, name.map(|s| s.to_string())));
        }
    }

    #[test]
    fn osc52_sets_clipboard() {
        let record = Rc::new(RefCell::new(ClipboardRecord::default()));
        let mut state = TerminalState::new(80, 24);
        state.attach_sink(Box::new(ClipboardSink(record.clone())));
        let mut parser = VtParser::new();
        // "hello world" in base64
        feed(&mut parser, &mut state, b"\x1b]52;c;aGVsbG8gd29ybGQ=\x07");
        assert_eq!(record.borrow().clipboard.as_deref(), Some("hello world"));
    }

    #[test]
    fn osc52_query_reports_clipboard() {
        let record = Rc::new(RefCell::new(ClipboardRecord::default()));
        record.borrow_mut().clipboard = Some("hi".to_string());
        let mut state = TerminalState::new(80, 24);
        state.attach_sink(Box::new(ClipboardSink(record)));
        let mut parser = VtParser::new();
        let responses = feed(&mut parser, &mut state, b"\x1b]52;c;?\x07");
        assert_eq!(responses, vec![Response::Clipboard("hi".to_string())]);
        assert_eq!(responses[0].to_bytes(), b"\x1b]52;c;aGk=\x1b\\");
    }

    #[test]
    fn osc52_query_without_sink_is_empty() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();
        let responses = feed(&mut parser, &mut state, b"\x1b]52;c;?\x1b\\");
        assert_eq!(responses, vec![Response::Clipboard(String::new())]);
        assert_eq!(responses[0].to_bytes(), b"\x1b]52;c;\x1b\\");
    }

    #[test]
    fn osc4_and_104_drive_palette() {
        let record = Rc::new(RefCell::new(ClipboardRecord::default()));
        let mut state = TerminalState::new(80, 24);
        state.attach_sink(Box::new(ClipboardSink(record.clone())));
        let mut parser = VtParser::new();
        feed(&mut parser, &mut state, b"\x1b]4;1;orange\x07");
        assert_eq!(state.palette.slot_name(1), Some("orange"));
        assert_eq!(
            record.borrow().reset_slots,
            vec![(1, Some("orange".to_string()))]
        );
        feed(&mut parser, &mut state, b"\x1b]104;1\x07");
        assert_eq!(state.palette.slot_name(1), None);
        feed(&mut parser, &mut state, b"\x1b]104\x07");
        assert!(record.borrow().reset_all);
    }

    #[test]
    fn bell_reaches_sink() {
        let record = Rc::new(RefCell::new(ClipboardRecord::default()));
        let mut state = TerminalState::new(80, 24);
        state.attach_sink(Box::new(ClipboardSink(record.clone())));
        let mut parser = VtParser::new();
        feed(&mut parser, &mut state, b"ding\x07");
        assert_eq!(record.borrow().bells, 1);
    }

    #[test]
    fn focus_mode_and_report() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();
        feed(&mut parser, &mut state, b"\x1b[?1004h");
        assert!(state.modes.focus_report);
        state.set_focus(false);
        assert!(state.win_mode().contains(WinMode::FOCUS_PENDING));
        assert_eq!(state.take_focus_report(), Some(&b"\x1b[O"[..]));
    }

    #[test]
    fn selection_untouched_by_cursor_motion() {
        let mut state = TerminalState::new(20, 5);
        let mut parser = VtParser::new();
        feed(&mut parser, &mut state, b"grab me");
        state.selection_start(0, 0, SelectionMode::Regular, SelectionSnap::None);
        state.selection_extend(3, 0, SelectionMode::Regular, SelectionSnap::None);
        feed(&mut parser, &mut state, b"\x1b[4;4H");
        assert_eq!(state.selection_text().as_deref(), Some("grab"));
    }

    #[test]
    fn oversized_osc_payload_is_capped() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();
        let mut seq = b"\x1b]2;".to_vec();
        seq.extend(std::iter::repeat(b'a').take(100_000));
        seq.push(0x07);
        seq.extend_from_slice(b"ok");
        feed(&mut parser, &mut state, &seq);
        assert!(state.title().len() <= 4096);
        assert_eq!(text_at(&state, 0), "ok");
    }

    #[test]
    fn excess_csi_params_are_dropped() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();
        let mut seq = b"\x1b[3;7".to_vec();
        for _ in 0..1000 {
            seq.extend_from_slice(b";1");
        }
        seq.push(b'H');
        feed(&mut parser, &mut state, &seq);
        // The first parameters still act; the overflow is ignored.
        assert_eq!(state.cursor(), (6, 2));
    }

    #[test]
    fn base64_encoder() {
        assert_eq!(base64_encode(b""), "");
        assert_eq!(base64_encode(b"h"), "aA==");
        assert_eq!(base64_encode(b"hi"), "aGk=");
        assert_eq!(base64_encode(b"hey"), "aGV5");
        assert_eq!(base64_encode(b"hello world"), "aGVsbG8gd29ybGQ=");
    }

    #[test]
    fn base64_decoder() {
        assert_eq!(base64_decode("aGk=").as_deref(), Some(&b"hi"[..]));
        assert_eq!(base64_decode("").as_deref(), Some(&b""[..]));
        assert_eq!(base64_decode("aGVsbG8gd29ybGQ=").as_deref(), Some(&b"hello world"[..]));
        assert!(base64_decode("not base64!").is_none());
    }
}
