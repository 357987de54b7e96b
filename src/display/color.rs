/*
 *  display/color.rs
 *
 *  vmu-screen - second screen for the VMU
 *  (c) 2020-26 Stuart Hunter
 *
 *  Two-color palette and the raw sample -> on/off color mapping
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::fmt;

use embedded_graphics::pixelcolor::Rgb888;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::BRIGHTNESS_THRESHOLD;

/// Opaque 24-bit color used for the on/off palette
///
/// Serialized as a `#RRGGBB` string so config files stay readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid color '{0}', expected #RRGGBB")]
pub struct ColorParseError(pub String);

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build from a 0xRRGGBB literal
    pub const fn from_hex(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xFF) as u8,
            g: ((hex >> 8) & 0xFF) as u8,
            b: (hex & 0xFF) as u8,
        }
    }

    /// Parse `#RRGGBB` (the leading `#` is optional)
    pub fn parse(text: &str) -> Result<Self, ColorParseError> {
        let trimmed = text.trim();
        let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ColorParseError(text.to_string()));
        }
        u32::from_str_radix(digits, 16)
            .map(Rgb::from_hex)
            .map_err(|_| ColorParseError(text.to_string()))
    }

    /// RGBA byte order as expected by pixel buffers
    #[inline]
    pub fn to_rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, 0xFF]
    }

    #[inline]
    pub fn to_rgb888(self) -> Rgb888 {
        Rgb888::new(self.r, self.g, self.b)
    }

    /// Straight per-channel mix, `t` in 0.0..=1.0
    #[inline]
    pub fn lerp(self, other: Rgb, t: f32) -> Rgb {
        let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        Rgb::new(mix(self.r, other.r), mix(self.g, other.g), mix(self.b, other.b))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl std::str::FromStr for Rgb {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rgb::parse(s)
    }
}

impl TryFrom<String> for Rgb {
    type Error = ColorParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Rgb::parse(&value)
    }
}

impl From<Rgb> for String {
    fn from(value: Rgb) -> Self {
        value.to_string()
    }
}

/// Sum of the three 8-bit color channels of a packed raw sample
///
/// The alpha byte (bits 24..32) is ignored.
#[inline]
pub fn channel_sum(sample: u32) -> u32 {
    (sample & 0xFF) + ((sample >> 8) & 0xFF) + ((sample >> 16) & 0xFF)
}

/// Whether a raw sample is a lit LCD segment
#[inline]
pub fn is_lit(sample: u32) -> bool {
    channel_sum(sample) > BRIGHTNESS_THRESHOLD
}

/// On/off color pair applied to the binary LCD image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub on: Rgb,
    pub off: Rgb,
}

impl Palette {
    pub const fn new(on: Rgb, off: Rgb) -> Self {
        Self { on, off }
    }

    /// Map one raw sample; a hard threshold, never a blend
    #[inline]
    pub fn map(&self, sample: u32) -> Rgb {
        if is_lit(sample) { self.on } else { self.off }
    }
}

/// Named color schemes
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ColorPreset {
    #[default]
    ClassicGreen,
    ClassicGray,
    HighContrast,
    Amber,
    Blue,
}

impl ColorPreset {
    pub const ALL: [ColorPreset; 5] = [
        ColorPreset::ClassicGreen,
        ColorPreset::ClassicGray,
        ColorPreset::HighContrast,
        ColorPreset::Amber,
        ColorPreset::Blue,
    ];

    pub fn palette(self) -> Palette {
        match self {
            ColorPreset::ClassicGreen => Palette::new(Rgb::from_hex(0x00FF00), Rgb::from_hex(0x001100)),
            ColorPreset::ClassicGray => Palette::new(Rgb::from_hex(0x000000), Rgb::from_hex(0x8B9B8B)),
            ColorPreset::HighContrast => Palette::new(Rgb::from_hex(0xFFFFFF), Rgb::from_hex(0x000000)),
            ColorPreset::Amber => Palette::new(Rgb::from_hex(0xFFBF00), Rgb::from_hex(0x1A0F00)),
            ColorPreset::Blue => Palette::new(Rgb::from_hex(0x00BFFF), Rgb::from_hex(0x000F1A)),
        }
    }

    /// Next preset in display order, wrapping around
    pub fn next(self) -> ColorPreset {
        let idx = Self::ALL.iter().position(|p| *p == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let c = Rgb::parse("#FFBF00").unwrap();
        assert_eq!(c, Rgb::new(0xFF, 0xBF, 0x00));
        assert_eq!(c.to_string(), "#FFBF00");
        assert_eq!(Rgb::parse("00bfff").unwrap(), Rgb::from_hex(0x00BFFF));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Rgb::parse("#FFF").is_err());
        assert!(Rgb::parse("#GG0000").is_err());
        assert!(Rgb::parse("").is_err());
    }

    #[test]
    fn test_channel_sum_ignores_alpha() {
        assert_eq!(channel_sum(0xFF00_0000), 0);
        assert_eq!(channel_sum(0xFFFF_FFFF), 765);
        assert_eq!(channel_sum(0x0001_0203), 6);
    }

    #[test]
    fn test_threshold_is_strictly_greater() {
        // 128 * 3 = 384 sits exactly on the threshold: off
        assert!(!is_lit(0xFF80_8080));
        // 129 + 128 + 128 = 385: on
        assert!(is_lit(0xFF80_8081));
        assert!(is_lit(0xFFFF_FFFF));
        assert!(!is_lit(0xFF00_0000));
    }

    #[test]
    fn test_palette_map() {
        let palette = ColorPreset::Amber.palette();
        assert_eq!(palette.map(0xFFFF_FFFF), palette.on);
        assert_eq!(palette.map(0xFF10_1010), palette.off);
    }

    #[test]
    fn test_preset_cycle_wraps() {
        let mut preset = ColorPreset::ClassicGreen;
        for _ in 0..ColorPreset::ALL.len() {
            preset = preset.next();
        }
        assert_eq!(preset, ColorPreset::ClassicGreen);
    }

    #[test]
    fn test_default_preset_colors() {
        let palette = ColorPreset::default().palette();
        assert_eq!(palette.on.to_string(), "#00FF00");
        assert_eq!(palette.off.to_string(), "#001100");
    }
}
