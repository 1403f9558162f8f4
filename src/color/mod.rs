//! Per-light color values.
//!
//! The render core treats colors as opaque slots. The stock effects use the
//! `smart_leds` 8-bit RGB and HSV types.

pub use smart_leds::hsv::hsv2rgb;
use smart_leds::RGB8;
use smart_leds::hsv::Hsv as HSV;

pub type Rgb = RGB8;
pub type Hsv = HSV;

/// Value every color slot holds right after a snapshot refresh.
pub const BLANK: Rgb = Rgb { r: 0, g: 0, b: 0 };

