//! Packed color decoding.

use crate::pcd::header::ColorChannels;

/// Convert the raw 32 bits of an rgb/rgba field to 0xAARRGGBB.
pub fn pack(bits: u32, channels: ColorChannels) -> u32 {
    match channels {
        ColorChannels::Rgb => bits | 0xFF00_0000,
        ColorChannels::Rgba => bits,
    }
}

/// Raw bits of an ASCII color token.
///
/// The token is either a plain integer or a float whose bit pattern is the
/// packed value; whichever parse succeeds decides the interpretation.
pub fn parse_token(token: &str) -> Option<u32> {
    if let Ok(value) = token.parse::<u32>() {
        return Some(value);
    }
    if let Ok(value) = token.parse::<i64>() {
        return Some(value as u32);
    }
    token.parse::<f32>().ok().map(f32::to_bits)
}

/// Split 0xAARRGGBB into `[r, g, b, a]`.
pub fn unpack(color: u32) -> [u8; 4] {
    let [b, g, r, a] = color.to_le_bytes();
    [r, g, b, a]
}
