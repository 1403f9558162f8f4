//! Light geometry and the flat light layout.

use std::panic::{AssertUnwindSafe, catch_unwind};

use glam::Vec3;
use log::warn;

use crate::device::DeviceRef;
use crate::error::panic_message;
use crate::scene::DeviceInRoom;

/// Axis-aligned bounding region of one physical light
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LightBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl LightBox {
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Box of `size` centered on `center`
    pub fn around(center: Vec3, size: Vec3) -> Self {
        let half = size * 0.5;
        Self {
            min: center - half,
            max: center + half,
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[must_use]
    pub fn translated(self, offset: Vec3) -> Self {
        Self {
            min: self.min + offset,
            max: self.max + offset,
        }
    }
}

/// Flat, parallel arrays of light boxes and their owning devices.
///
/// Index `i` of both arrays describes the same light; this index space is
/// shared by the color buffer and dispatch.
#[derive(Clone, Default)]
pub struct LightLayout {
    boxes: Vec<LightBox>,
    devices: Vec<DeviceRef>,
}

impl LightLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the layout from an already ordered device list.
    ///
    /// Boxes are appended device by device, in the order each device
    /// reports them. The owning device is appended once per box. A device
    /// whose box query panics contributes no lights.
    pub fn sample(&mut self, devices: &[DeviceInRoom]) {
        self.boxes.clear();
        self.devices.clear();

        for placed in devices {
            let boxes = match catch_unwind(AssertUnwindSafe(|| placed.light_bounding_boxes())) {
                Ok(boxes) => boxes,
                Err(payload) => {
                    warn!(
                        "skipping device `{}`: box query panicked: {}",
                        placed.device.name(),
                        panic_message(&*payload)
                    );
                    continue;
                }
            };
            self.devices
                .extend(core::iter::repeat_n(placed.device.clone(), boxes.len()));
            self.boxes.extend(boxes);
        }
    }

    pub fn boxes(&self) -> &[LightBox] {
        &self.boxes
    }

    pub fn devices(&self) -> &[DeviceRef] {
        &self.devices
    }

    /// Number of lights
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}
