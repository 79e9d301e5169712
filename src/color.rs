//! Indicator colors and their `SET_COLOR` payload form.

/// An RGB color for the indicator strip.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Color {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Color {
    /// Indicator off.
    pub const OFF: Color = Color::new(0, 0, 0);
    /// The client that buzzed first.
    pub const ACTIVE: Color = Color::new(0, 255, 0);
    /// Every other client while the buzzer-press lock is held.
    pub const LOCKED: Color = Color::new(255, 0, 0);
    /// The buzzed client after the operator marked a wrong answer.
    pub const WRONG: Color = Color::new(255, 96, 0);
    /// Pairing-mode blink color on both roles.
    pub const PAIRING: Color = Color::new(0, 0, 255);

    /// Creates a color from its channels.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parses a `SET_COLOR` payload. Extra trailing bytes are ignored.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        match payload {
            [r, g, b, ..] => Some(Color::new(*r, *g, *b)),
            _ => None,
        }
    }

    /// The `SET_COLOR` payload for this color.
    pub fn to_payload(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}
