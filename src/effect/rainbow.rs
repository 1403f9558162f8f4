//! Rainbow cycling effect
//!
//! Cycles hue over time and spreads it across the room along the x axis,
//! so neighbouring lights of different devices blend into one gradient.

use embassy_time::Duration;

use super::Effect;
use crate::color::{Hsv, Rgb, hsv2rgb};
use crate::error::EffectError;
use crate::geometry::LightBox;

const DEFAULT_CYCLE_MS: u64 = 12_000;
/// Hue steps (of 256) per room unit along the x axis
const DEFAULT_HUE_SPREAD: f32 = 32.0;

/// Rainbow effect driven by accumulated tick time and light position
#[derive(Debug, Clone)]
pub struct RainbowEffect {
    /// Duration of one complete rainbow cycle
    cycle_duration: Duration,
    /// Time into the current cycle
    elapsed: Duration,
    /// Hue offset per room unit
    spread: f32,
    /// Brightness value (0-255)
    value: u8,
    /// Saturation (0-255)
    saturation: u8,
}

impl Default for RainbowEffect {
    fn default() -> Self {
        Self {
            cycle_duration: Duration::from_millis(DEFAULT_CYCLE_MS),
            elapsed: Duration::from_ticks(0),
            spread: DEFAULT_HUE_SPREAD,
            value: 255,
            saturation: 255,
        }
    }
}

impl RainbowEffect {
    /// Set the cycle duration
    #[must_use]
    pub fn with_cycle_duration(mut self, duration: Duration) -> Self {
        self.cycle_duration = duration;
        self
    }

    /// Set the hue offset per room unit
    #[must_use]
    pub fn with_spread(mut self, spread: f32) -> Self {
        self.spread = spread;
        self
    }

    /// Set the brightness value
    #[must_use]
    pub fn with_value(mut self, value: u8) -> Self {
        self.value = value;
        self
    }

    /// Set the saturation
    #[must_use]
    pub fn with_saturation(mut self, saturation: u8) -> Self {
        self.saturation = saturation;
        self
    }

    /// Hue at the room origin for the current cycle position
    #[allow(clippy::cast_possible_truncation)]
    pub fn base_hue(&self) -> u8 {
        let cycle = self.cycle_duration.as_ticks().max(1);
        ((self.elapsed.as_ticks() % cycle) * 255 / cycle) as u8
    }
}

impl Effect for RainbowEffect {
    fn name(&self) -> &str {
        "rainbow"
    }

    fn tick(&mut self, delta: Duration) {
        let cycle = self.cycle_duration.as_ticks().max(1);
        self.elapsed = Duration::from_ticks((self.elapsed.as_ticks() + delta.as_ticks()) % cycle);
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn update(&mut self, boxes: &[LightBox], colors: &mut [Rgb]) -> Result<(), EffectError> {
        let base_hue = self.base_hue();
        for (light, color) in boxes.iter().zip(colors.iter_mut()) {
            let offset = (light.center().x * self.spread).rem_euclid(256.0) as u8;
            *color = hsv2rgb(Hsv {
                hue: base_hue.wrapping_add(offset),
                sat: self.saturation,
                val: self.value,
            });
        }
        Ok(())
    }
}
