//! Effect system
//!
//! Effects are stateful per-tick color generators. A room holds an ordered
//! list of shared [`EffectHandle`]s; the [`EffectPipeline`] runs them one
//! after another against the room's flat color buffer.

mod rainbow;
mod static_color;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use embassy_time::Duration;
use log::warn;
use parking_lot::Mutex;

pub use rainbow::RainbowEffect;
pub use static_color::StaticColorEffect;

use crate::color::Rgb;
use crate::error::{EffectError, panic_message};
use crate::geometry::LightBox;

pub trait Effect: Send {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Advance internal state by `delta`
    fn tick(&mut self, delta: Duration);

    /// Write colors for the lights this effect controls.
    ///
    /// `colors[i]` belongs to `boxes[i]`. Colors written by earlier effects
    /// in the same tick are visible and may be overwritten or blended.
    fn update(&mut self, boxes: &[LightBox], colors: &mut [Rgb]) -> Result<(), EffectError>;
}

/// Shared, lockable effect handle stored in rooms
pub type EffectHandle = Arc<Mutex<dyn Effect>>;

/// Wrap an effect into a handle
pub fn effect_handle<E: Effect + 'static>(effect: E) -> EffectHandle {
    Arc::new(Mutex::new(effect))
}

/// Outcome of one pipeline run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// Effects that were invoked
    pub invoked: usize,
    /// Effects whose invocation failed and was skipped
    pub failed: usize,
}

/// Sequential effect executor.
///
/// Every effect gets exclusive access to the color buffer for its own
/// invocation. A failing or panicking effect is logged and skipped; the
/// remaining effects still run.
#[derive(Debug, Default)]
pub struct EffectPipeline {
    failures: u64,
}

impl EffectPipeline {
    pub const fn new() -> Self {
        Self { failures: 0 }
    }

    /// Total failed invocations since creation
    pub const fn failures(&self) -> u64 {
        self.failures
    }

    /// Run every effect once, in list order
    pub fn run(
        &mut self,
        effects: &[EffectHandle],
        delta: Duration,
        boxes: &[LightBox],
        colors: &mut [Rgb],
    ) -> PipelineReport {
        let mut report = PipelineReport::default();
        if boxes.len() != colors.len() {
            warn!(
                "skipping {} effects: {}",
                effects.len(),
                EffectError::LayoutMismatch {
                    boxes: boxes.len(),
                    colors: colors.len(),
                }
            );
            report.failed = effects.len();
            self.failures += effects.len() as u64;
            return report;
        }

        for handle in effects {
            report.invoked += 1;
            let mut effect = handle.lock();
            if let Err(err) = invoke(&mut *effect, delta, boxes, colors) {
                warn!("effect `{}` failed: {}", effect.name(), err);
                report.failed += 1;
                self.failures += 1;
            }
        }

        report
    }
}

fn invoke(
    effect: &mut dyn Effect,
    delta: Duration,
    boxes: &[LightBox],
    colors: &mut [Rgb],
) -> Result<(), EffectError> {
    let result = catch_unwind(AssertUnwindSafe(|| {
        effect.tick(delta);
        effect.update(boxes, colors)
    }));

    match result {
        Ok(result) => result,
        Err(payload) => Err(EffectError::Panicked {
            effect: effect.name().to_string(),
            message: panic_message(&*payload),
        }),
    }
}
