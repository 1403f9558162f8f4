//! Hand-off of finished frames to device providers.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use log::warn;

use crate::color::Rgb;
use crate::device::{DeviceRef, ProviderRegistry};
use crate::error::{DispatchError, panic_message};
use crate::geometry::LightBox;

/// What changed since the last successful dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirtyFlags {
    pub colors: bool,
    pub positions: bool,
    pub devices: bool,
}

impl DirtyFlags {
    pub const ALL: Self = Self {
        colors: true,
        positions: true,
        devices: true,
    };

    pub const fn any(self) -> bool {
        self.colors || self.positions || self.devices
    }

    pub fn mark_all(&mut self) {
        *self = Self::ALL;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Borrowed view of one rendered frame
#[derive(Clone, Copy)]
pub struct LightUpdate<'a> {
    pub boxes: &'a [LightBox],
    pub devices: &'a [DeviceRef],
    pub colors: &'a [Rgb],
    pub dirty: DirtyFlags,
}

impl<'a> LightUpdate<'a> {
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Contiguous runs of lights owned by the same device
    pub fn device_groups(&self) -> DeviceGroups<'a> {
        DeviceGroups {
            update: *self,
            start: 0,
        }
    }
}

/// Lights of one device within a frame
pub struct DeviceGroup<'a> {
    pub device: &'a DeviceRef,
    /// Index of the first light in the frame
    pub start: usize,
    pub boxes: &'a [LightBox],
    pub colors: &'a [Rgb],
}

/// Iterator over [`DeviceGroup`]s, see [`LightUpdate::device_groups`]
pub struct DeviceGroups<'a> {
    update: LightUpdate<'a>,
    start: usize,
}

impl<'a> Iterator for DeviceGroups<'a> {
    type Item = DeviceGroup<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let devices = self.update.devices;
        let start = self.start;
        let device = devices.get(start)?;
        let len = devices[start..]
            .iter()
            .take_while(|other| Arc::ptr_eq(device, other))
            .count();
        let end = start + len;
        self.start = end;

        Some(DeviceGroup {
            device,
            start,
            boxes: &self.update.boxes[start..end],
            colors: &self.update.colors[start..end],
        })
    }
}

/// Receiver of finished frames
pub trait DeviceDispatch: Send {
    fn dispatch(&mut self, update: &LightUpdate<'_>) -> Result<(), DispatchError>;
}

/// Dispatch that discards every frame
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDispatch;

impl DeviceDispatch for NullDispatch {
    fn dispatch(&mut self, _update: &LightUpdate<'_>) -> Result<(), DispatchError> {
        Ok(())
    }
}

/// Dispatch that forwards every device's lights to its provider
#[derive(Clone, Default)]
pub struct ProviderDispatch {
    registry: ProviderRegistry,
}

impl ProviderDispatch {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self { registry }
    }
}

impl DeviceDispatch for ProviderDispatch {
    /// Delivers every group even if some fail; returns the first failure
    fn dispatch(&mut self, update: &LightUpdate<'_>) -> Result<(), DispatchError> {
        let mut first_error = None;

        for group in update.device_groups() {
            let tag = group.device.provider_type();
            let result = match self.registry.get(tag) {
                Some(provider) => catch_unwind(AssertUnwindSafe(|| {
                    provider.write(group.device, group.boxes, group.colors, update.dirty)
                }))
                .unwrap_or_else(|payload| {
                    Err(DispatchError::Panicked {
                        target: group.device.name().to_string(),
                        message: panic_message(&*payload),
                    })
                }),
                None => Err(DispatchError::UnknownProvider(tag)),
            };

            if let Err(err) = result {
                warn!("dispatch to `{}` failed: {}", group.device.name(), err);
                first_error.get_or_insert(err);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}
