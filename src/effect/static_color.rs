//! Static color fill effect
//!
//! Fills every light with a single solid color.

use embassy_time::Duration;

use super::Effect;
use crate::color::Rgb;
use crate::error::EffectError;
use crate::geometry::LightBox;

/// Static color effect - fills all lights with one color
#[derive(Debug, Clone)]
pub struct StaticColorEffect {
    color: Rgb,
}

impl StaticColorEffect {
    /// Create a new static color effect
    pub const fn new(color: Rgb) -> Self {
        Self { color }
    }

    pub const fn color(&self) -> Rgb {
        self.color
    }

    /// Change the fill color, applied on the next tick
    pub fn set_color(&mut self, color: Rgb) {
        self.color = color;
    }
}

impl Effect for StaticColorEffect {
    fn name(&self) -> &str {
        "static"
    }

    fn tick(&mut self, _delta: Duration) {}

    fn update(&mut self, _boxes: &[LightBox], colors: &mut [Rgb]) -> Result<(), EffectError> {
        colors.fill(self.color);
        Ok(())
    }
}
