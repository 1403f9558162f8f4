//! Device and provider capability interfaces.
//!
//! Devices are owned by their providers; rooms and the render thread only
//! hold shared [`DeviceRef`] handles.

use core::cmp::Ordering;
use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;

use crate::color::Rgb;
use crate::dispatch::DirtyFlags;
use crate::error::DispatchError;
use crate::geometry::LightBox;
use crate::scene::DeviceInRoom;

/// Shared handle to a device
pub type DeviceRef = Arc<dyn Device>;

/// Tag naming the provider (driver family) a device belongs to.
///
/// Tags are totally ordered, which gives devices of different providers a
/// deterministic relative order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProviderType(&'static str);

impl ProviderType {
    pub const fn new(tag: &'static str) -> Self {
        Self(tag)
    }

    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Physical or virtual addressable lighting unit
pub trait Device: Send + Sync {
    /// Human readable device name
    fn name(&self) -> &str;

    /// Provider this device is driven by
    fn provider_type(&self) -> ProviderType;

    /// Bounding boxes of every light, in device-local space.
    ///
    /// The order of the returned boxes is the order colors are delivered in.
    fn light_bounding_boxes(&self) -> Vec<LightBox>;
}

/// Driver family for a class of devices
pub trait Provider: Send + Sync {
    /// Order two devices of this provider (e.g. physical chain order).
    ///
    /// Devices reported as equal keep their relative room order.
    fn compare(&self, _a: &DeviceInRoom, _b: &DeviceInRoom) -> Ordering {
        Ordering::Equal
    }

    /// Deliver the colors of one device.
    ///
    /// `boxes` and `colors` are the device's slice of the frame, in the
    /// order the device reported its boxes.
    fn write(
        &self,
        _device: &DeviceRef,
        _boxes: &[LightBox],
        _colors: &[Rgb],
        _dirty: DirtyFlags,
    ) -> Result<(), DispatchError> {
        Ok(())
    }
}

/// Mapping from provider tag to provider, injected into the scheduler
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderType, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing any previous one for the same tag
    pub fn register(&mut self, tag: ProviderType, provider: Arc<dyn Provider>) {
        self.providers.insert(tag, provider);
    }

    /// Register a provider
    #[must_use]
    pub fn with_provider(mut self, tag: ProviderType, provider: impl Provider + 'static) -> Self {
        self.register(tag, Arc::new(provider));
        self
    }

    pub fn get(&self, tag: ProviderType) -> Option<&Arc<dyn Provider>> {
        self.providers.get(&tag)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
