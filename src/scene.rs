//! Scene description shared between editors and the render thread.
//!
//! [`SceneStore`] owns the room list and the active room selector behind one
//! exclusive lock. Editors mutate it through a scoped [`SceneWriter`]; the
//! render thread only ever takes short locked copies.

use core::ops::Deref;
use core::sync::atomic::{AtomicBool, Ordering};

use glam::Vec3;
use log::trace;
use parking_lot::{Mutex, MutexGuard};

use crate::device::{DeviceRef, ProviderType};
use crate::effect::EffectHandle;
use crate::geometry::LightBox;

/// Placement of a device inside a room
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Placement {
    /// Room-space translation applied to the device's light boxes
    pub offset: Vec3,
}

/// Device reference together with its placement in a room
#[derive(Clone)]
pub struct DeviceInRoom {
    pub device: DeviceRef,
    pub placement: Placement,
}

impl DeviceInRoom {
    pub fn new(device: DeviceRef) -> Self {
        Self {
            device,
            placement: Placement::default(),
        }
    }

    #[must_use]
    pub fn with_offset(mut self, offset: Vec3) -> Self {
        self.placement.offset = offset;
        self
    }

    pub fn provider_type(&self) -> ProviderType {
        self.device.provider_type()
    }

    /// Light boxes of the device in room space
    pub fn light_bounding_boxes(&self) -> Vec<LightBox> {
        let offset = self.placement.offset;
        self.device
            .light_bounding_boxes()
            .into_iter()
            .map(|light| light.translated(offset))
            .collect()
    }
}

/// One lighting scene: ordered devices and ordered effects.
///
/// Cloning a room shares its device and effect handles, so effect state
/// survives snapshot copies.
#[derive(Clone, Default)]
pub struct Room {
    pub name: String,
    pub devices: Vec<DeviceInRoom>,
    pub effects: Vec<EffectHandle>,
}

impl Room {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_device(mut self, device: DeviceInRoom) -> Self {
        self.devices.push(device);
        self
    }

    #[must_use]
    pub fn with_effect(mut self, effect: EffectHandle) -> Self {
        self.effects.push(effect);
        self
    }

    /// Room without devices and effects
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty() && self.effects.is_empty()
    }
}

#[derive(Default)]
struct SceneState {
    rooms: Vec<Room>,
    active_room_index: usize,
}

impl SceneState {
    fn active_room(&self) -> Option<&Room> {
        self.rooms.get(self.active_room_index)
    }

    fn active_room_or_empty(&self) -> Room {
        match self.active_room() {
            Some(room) => room.clone(),
            None => {
                trace!(
                    "active room index {} out of range ({} rooms), rendering empty room",
                    self.active_room_index,
                    self.rooms.len()
                );
                Room::default()
            }
        }
    }
}

/// Authoritative room list with an active room selector and a dirty marker
#[derive(Default)]
pub struct SceneStore {
    state: Mutex<SceneState>,
    dirty: AtomicBool,
}

impl SceneStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `rooms` with `active_room_index` selected
    pub fn with_rooms(rooms: Vec<Room>, active_room_index: usize) -> Self {
        Self {
            state: Mutex::new(SceneState {
                rooms,
                active_room_index,
            }),
            dirty: AtomicBool::new(false),
        }
    }

    /// Scoped read access; the store stays locked while the view lives
    pub fn read(&self) -> RoomsView<'_> {
        RoomsView {
            guard: self.state.lock(),
        }
    }

    /// Copy of the room list taken under the lock
    pub fn rooms(&self) -> Vec<Room> {
        self.state.lock().rooms.clone()
    }

    pub fn active_room_index(&self) -> usize {
        self.state.lock().active_room_index
    }

    /// Copy of the active room, or an empty room if the selector is out of range
    pub fn active_room(&self) -> Room {
        self.state.lock().active_room_or_empty()
    }

    /// Scoped write access; marks the store dirty when released
    pub fn begin_write(&self) -> SceneWriter<'_> {
        SceneWriter {
            dirty: &self.dirty,
            guard: self.state.lock(),
        }
    }

    /// Whether any write happened since the marker was last cleared
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Copy the active room for rendering.
    ///
    /// With `clear_dirty`, the marker is reset while the lock is held, so a
    /// write finishing after the copy marks the store dirty again.
    pub(crate) fn snapshot_active_room(&self, clear_dirty: bool) -> Room {
        let state = self.state.lock();
        if clear_dirty {
            self.dirty.store(false, Ordering::Release);
        }
        state.active_room_or_empty()
    }
}

/// Locked read-only view of the room list
pub struct RoomsView<'a> {
    guard: MutexGuard<'a, SceneState>,
}

impl RoomsView<'_> {
    pub fn active_room_index(&self) -> usize {
        self.guard.active_room_index
    }

    pub fn active_room(&self) -> Option<&Room> {
        self.guard.active_room()
    }
}

impl Deref for RoomsView<'_> {
    type Target = [Room];

    fn deref(&self) -> &Self::Target {
        &self.guard.rooms
    }
}

/// Scoped write handle for a [`SceneStore`].
///
/// Dropping the writer (on any exit path, unwinding included) sets the dirty
/// marker and then releases the lock.
pub struct SceneWriter<'a> {
    dirty: &'a AtomicBool,
    guard: MutexGuard<'a, SceneState>,
}

impl SceneWriter<'_> {
    pub fn rooms_mut(&mut self) -> &mut Vec<Room> {
        &mut self.guard.rooms
    }

    pub fn active_room_index(&self) -> usize {
        self.guard.active_room_index
    }

    /// Select the active room. Out of range indices render an empty room.
    pub fn set_active_room_index(&mut self, index: usize) {
        self.guard.active_room_index = index;
    }

    /// Append a room and return its index
    pub fn push_room(&mut self, room: Room) -> usize {
        self.guard.rooms.push(room);
        self.guard.rooms.len() - 1
    }

    pub fn active_room_mut(&mut self) -> Option<&mut Room> {
        let index = self.guard.active_room_index;
        self.guard.rooms.get_mut(index)
    }
}

impl Drop for SceneWriter<'_> {
    fn drop(&mut self) {
        // The guard field is dropped after this, so the marker is set under the lock.
        self.dirty.store(true, Ordering::Release);
    }
}
