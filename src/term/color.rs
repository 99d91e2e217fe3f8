//! Terminal color model
//!
//! Cells reference colors symbolically ([`Color`]); the 256-slot
//! [`ColorPalette`] plus the distinguished default foreground, background,
//! and cursor colors resolve them to RGB. At the presentation boundary a
//! color travels as one packed 32-bit value: bit 24 set means a palette (or
//! distinguished) index in the low nine bits, bit 24 clear means literal RGB
//! in bits 16/8/0 with bits 25..=31 carrying an inverted alpha.

/// Flag bit: the packed value is a palette/distinguished index.
pub const PALETTE_FLAG: u32 = 1 << 24;

/// Distinguished indices beyond the 256 ordinary slots.
pub const DEFAULT_FOREGROUND: u32 = 256;
pub const DEFAULT_BACKGROUND: u32 = 257;
pub const DEFAULT_CURSOR: u32 = 258;

/// A color reference carried by a glyph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Color {
    /// Default foreground or background, resolved by position.
    #[default]
    Default,
    /// One of the 256 palette slots.
    Indexed(u8),
    /// Literal 24-bit RGB.
    Rgb(u8, u8, u8),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl Color {
    /// Pack for the presentation boundary, resolving `Default` to the
    /// distinguished foreground index.
    pub fn encode_fg(self) -> u32 {
        self.encode(DEFAULT_FOREGROUND)
    }

    /// Pack, resolving `Default` to the distinguished background index.
    pub fn encode_bg(self) -> u32 {
        self.encode(DEFAULT_BACKGROUND)
    }

    fn encode(self, default_index: u32) -> u32 {
        match self {
            Color::Default => PALETTE_FLAG | default_index,
            Color::Indexed(i) => PALETTE_FLAG | i as u32,
            // Fully opaque: inverted alpha bits stay zero.
            Color::Rgb(r, g, b) => ((r as u32) << 16) | ((g as u32) << 8) | b as u32,
        }
    }

    /// Unpack a boundary value. The distinguished indices all decode to
    /// `Default`; which default applies is positional.
    pub fn decode(value: u32) -> Self {
        if value & PALETTE_FLAG != 0 {
            let index = value & 0x1FF;
            if index > 0xFF {
                Color::Default
            } else {
                Color::Indexed(index as u8)
            }
        } else {
            Color::Rgb((value >> 16) as u8, (value >> 8) as u8, value as u8)
        }
    }

    /// Alpha channel of a packed value (inverted in bits 25..=31).
    pub fn decode_alpha(value: u32) -> u8 {
        if value & PALETTE_FLAG != 0 {
            0xFF
        } else {
            !((value >> 25) as u8) & 0xFF
        }
    }
}

/// The standard 16 ANSI colors (xterm defaults).
const ANSI_COLORS: [Rgb; 16] = [
    Rgb::new(0x00, 0x00, 0x00),
    Rgb::new(0xCD, 0x00, 0x00),
    Rgb::new(0x00, 0xCD, 0x00),
    Rgb::new(0xCD, 0xCD, 0x00),
    Rgb::new(0x00, 0x00, 0xEE),
    Rgb::new(0xCD, 0x00, 0xCD),
    Rgb::new(0x00, 0xCD, 0xCD),
    Rgb::new(0xE5, 0xE5, 0xE5),
    Rgb::new(0x7F, 0x7F, 0x7F),
    Rgb::new(0xFF, 0x00, 0x00),
    Rgb::new(0x00, 0xFF, 0x00),
    Rgb::new(0xFF, 0xFF, 0x00),
    Rgb::new(0x5C, 0x5C, 0xFF),
    Rgb::new(0xFF, 0x00, 0xFF),
    Rgb::new(0x00, 0xFF, 0xFF),
    Rgb::new(0xFF, 0xFF, 0xFF),
];

/// Levels of the 6x6x6 color cube.
const CUBE_LEVELS: [u8; 6] = [0x00, 0x5F, 0x87, 0xAF, 0xD7, 0xFF];

fn xterm_default(index: u8) -> Rgb {
    match index {
        0..=15 => ANSI_COLORS[index as usize],
        16..=231 => {
            let i = index as usize - 16;
            Rgb::new(
                CUBE_LEVELS[i / 36],
                CUBE_LEVELS[(i / 6) % 6],
                CUBE_LEVELS[i % 6],
            )
        }
        232..=255 => {
            let v = 8 + 10 * (index - 232);
            Rgb::new(v, v, v)
        }
    }
}

/// 256 indexed slots plus the distinguished defaults. Slots may carry a
/// name string (set via OSC 4) used when the presentation layer re-resolves
/// a reset slot.
pub struct ColorPalette {
    slots: Vec<(Rgb, Option<String>)>,
    pub default_fg: Rgb,
    pub default_bg: Rgb,
    pub default_cursor: Rgb,
}

impl Default for ColorPalette {
    fn default() -> Self {
        Self::new()
    }
}

impl ColorPalette {
    pub fn new() -> Self {
        Self {
            slots: (0..=255u8).map(|i| (xterm_default(i), None)).collect(),
            default_fg: Rgb::new(0xE5, 0xE5, 0xE5),
            default_bg: Rgb::new(0x00, 0x00, 0x00),
            default_cursor: Rgb::new(0xE5, 0xE5, 0xE5),
        }
    }

    pub fn slot(&self, index: u8) -> Rgb {
        self.slots[index as usize].0
    }

    pub fn slot_name(&self, index: u8) -> Option<&str> {
        self.slots[index as usize].1.as_deref()
    }

    pub fn set_name(&mut self, index: u8, name: &str) {
        self.slots[index as usize].1 = Some(name.to_string());
    }

    /// Restore one slot to its xterm default, clearing its name.
    pub fn reset(&mut self, index: u8) {
        self.slots[index as usize] = (xterm_default(index), None);
    }

    /// Restore every slot to its xterm default.
    pub fn reset_all(&mut self) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            *slot = (xterm_default(i as u8), None);
        }
    }

    /// Resolve a foreground reference to RGB.
    pub fn resolve_fg(&self, color: Color) -> Rgb {
        match color {
            Color::Default => self.default_fg,
            Color::Indexed(i) => self.slot(i),
            Color::Rgb(r, g, b) => Rgb::new(r, g, b),
        }
    }

    /// Resolve a background reference to RGB.
    pub fn resolve_bg(&self, color: Color) -> Rgb {
        match color {
            Color::Default => self.default_bg,
            Color::Indexed(i) => self.slot(i),
            Color::Rgb(r, g, b) => Rgb::new(r, g, b),
        }
    }
}
