//! This module contains global constants used across the display and bridge modules.

/// The width of the VMU LCD in pixels.
pub const LCD_WIDTH: usize = 48;
/// The height of the VMU LCD in pixels.
pub const LCD_HEIGHT: usize = 32;
/// Total number of samples in one LCD frame (48 x 32).
pub const LCD_PIXELS: usize = LCD_WIDTH * LCD_HEIGHT;

/// 4 controllers x 2 expansion slots.
pub const MAX_INSTANCES: usize = 8;

/// Channel sum (r + g + b) above which a raw sample counts as a lit pixel.
/// Roughly 50% of the 765 maximum.
pub const BRIGHTNESS_THRESHOLD: u32 = 384;

/// Touch zones are a coarse 3x3 grid over the surface.
pub const TOUCH_GRID: u32 = 3;

/// Fraction of a secondary target the LCD may occupy, as 9/10.
/// Kept as a ratio so the scale floors exactly (1920 * 0.9f32 / 48 < 36).
pub const SECONDARY_MARGIN_NUM: u64 = 9;
pub const SECONDARY_MARGIN_DEN: u64 = 10;

/// Gap between the primary overlay and the bottom-right screen edges.
pub const OVERLAY_MARGIN: u32 = 16;

/// Default overlay scale (48x32 -> 192x128).
pub const DEFAULT_SCALE: f32 = 4.0;
/// Default poll rate for the LCD.
pub const DEFAULT_FPS: u32 = 30;
