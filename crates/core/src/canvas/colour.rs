use serde::{Deserialize, Serialize};

/// An RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Colour {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Colour {
    pub const TRANSPARENT: Colour = Colour::rgba(0, 0, 0, 0);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::rgba(r, g, b, 255)
    }

    /// Unpack a `0xRRGGBBAA` value.
    pub fn from_packed(value: u32) -> Self {
        let [r, g, b, a] = value.to_be_bytes();
        Self { r, g, b, a }
    }

    pub fn to_packed(self) -> u32 {
        u32::from_be_bytes(self.channels())
    }

    pub fn channels(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// `#rrggbb` notation, used when drawing text.
    pub fn to_hex_rgb(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Palette used when a snapshot's metadata carries none.
pub const DEFAULT_PALETTE: [Colour; 32] = [
    Colour::opaque(109, 0, 26),
    Colour::opaque(190, 0, 57),
    Colour::opaque(255, 69, 0),
    Colour::opaque(255, 168, 0),
    Colour::opaque(255, 214, 53),
    Colour::opaque(255, 248, 184),
    Colour::opaque(0, 163, 104),
    Colour::opaque(0, 204, 120),
    Colour::opaque(126, 237, 86),
    Colour::opaque(0, 117, 111),
    Colour::opaque(0, 158, 170),
    Colour::opaque(0, 204, 192),
    Colour::opaque(36, 80, 164),
    Colour::opaque(54, 144, 234),
    Colour::opaque(81, 233, 244),
    Colour::opaque(73, 58, 193),
    Colour::opaque(106, 92, 255),
    Colour::opaque(148, 179, 255),
    Colour::opaque(129, 30, 159),
    Colour::opaque(180, 74, 192),
    Colour::opaque(228, 171, 255),
    Colour::opaque(222, 16, 127),
    Colour::opaque(255, 56, 129),
    Colour::opaque(255, 153, 170),
    Colour::opaque(109, 72, 47),
    Colour::opaque(156, 105, 38),
    Colour::opaque(255, 180, 112),
    Colour::opaque(0, 0, 0),
    Colour::opaque(81, 82, 82),
    Colour::opaque(137, 141, 144),
    Colour::opaque(212, 215, 217),
    Colour::opaque(255, 255, 255),
];

/// Stable per-name colour: a 31-multiplier hash spread over the channels.
///
/// Alpha is always opaque so the colour stays visible in rendered images.
pub fn colour_hash(text: &str) -> Colour {
    let hash = text
        .bytes()
        .fold(0u32, |hash, byte| hash.wrapping_mul(31).wrapping_add(u32::from(byte)));
    Colour::rgba((hash >> 24) as u8, (hash >> 16) as u8, (hash >> 8) as u8, 255)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_roundtrip_order() {
        let colour = Colour::from_packed(0xFF450080);
        assert_eq!(colour, Colour::rgba(0xFF, 0x45, 0x00, 0x80));
        assert_eq!(colour.to_packed(), 0xFF450080);
    }

    #[test]
    fn test_colour_hash_is_stable() {
        // "ab" = (97 * 31) + 98 = 3105 = 0x00000C21
        assert_eq!(colour_hash("ab"), Colour::rgba(0x00, 0x00, 0x0C, 255));
        assert_eq!(colour_hash("zekiah"), colour_hash("zekiah"));
        assert_ne!(colour_hash("zekiah"), colour_hash("haikez"));
    }

    #[test]
    fn test_hex_rgb() {
        assert_eq!(Colour::rgba(255, 69, 0, 255).to_hex_rgb(), "#ff4500");
    }
}
