//! Deterministic device ordering within a room.

use core::cmp::Ordering;
use std::panic::{AssertUnwindSafe, catch_unwind};

use log::warn;

use crate::device::ProviderRegistry;
use crate::error::panic_message;
use crate::scene::DeviceInRoom;

/// Two-tier device comparator.
///
/// Devices of the same provider are ordered by that provider's comparator.
/// Devices of different providers are ordered by provider tag.
#[derive(Clone, Default)]
pub struct DeviceOrderer {
    registry: ProviderRegistry,
}

impl DeviceOrderer {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self { registry }
    }

    /// Compare two placed devices
    pub fn compare(&self, a: &DeviceInRoom, b: &DeviceInRoom) -> Ordering {
        let a_type = a.provider_type();
        let b_type = b.provider_type();
        if a_type != b_type {
            return a_type.cmp(&b_type);
        }
        // Unknown providers leave their devices in room order
        self.registry
            .get(a_type)
            .map_or(Ordering::Equal, |provider| provider.compare(a, b))
    }

    /// Stable sort of a room's devices.
    ///
    /// If a provider comparator panics, the devices keep whatever order the
    /// interrupted sort left them in. No device is lost.
    pub fn sort(&self, devices: &mut [DeviceInRoom]) {
        let sorted = catch_unwind(AssertUnwindSafe(|| {
            devices.sort_by(|a, b| self.compare(a, b));
        }));
        if let Err(payload) = sorted {
            warn!("device comparator panicked: {}", panic_message(&*payload));
        }
    }
}
