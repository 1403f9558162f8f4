use std::panic::{AssertUnwindSafe, catch_unwind};

use embassy_time::Duration;
use log::{debug, warn};

use crate::color::{BLANK, Rgb};
use crate::device::{DeviceRef, ProviderRegistry};
use crate::dispatch::{DeviceDispatch, DirtyFlags, LightUpdate};
use crate::effect::{EffectPipeline, PipelineReport};
use crate::error::{DispatchError, panic_message};
use crate::geometry::{LightBox, LightLayout};
use crate::ordering::DeviceOrderer;
use crate::scene::{Room, SceneStore};

/// When the render thread re-copies the active room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshPolicy {
    /// Refresh when the store is dirty and clear the marker while copying
    #[default]
    ClearOnRefresh,
    /// Never clear the marker: once written, every tick re-copies and re-sorts
    AlwaysRefresh,
}

/// Result of one [`RenderState::tick`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Flags handed to dispatch
    pub dirty: DirtyFlags,
    pub effects: PipelineReport,
}

/// Render thread working state.
///
/// Holds a private copy of the active room and the flat box, device and
/// color arrays derived from it. A tick is a [`RenderState::render`] step
/// followed by a [`RenderState::dispatch`] step; the render thread only
/// locks the dispatch target for the second one.
pub struct RenderState {
    room: Room,
    layout: LightLayout,
    colors: Vec<Rgb>,
    dirty: DirtyFlags,
    orderer: DeviceOrderer,
    pipeline: EffectPipeline,
    policy: RefreshPolicy,
}

impl RenderState {
    pub fn new(registry: ProviderRegistry, policy: RefreshPolicy) -> Self {
        Self {
            room: Room::default(),
            layout: LightLayout::new(),
            colors: Vec::new(),
            dirty: DirtyFlags::default(),
            orderer: DeviceOrderer::new(registry),
            pipeline: EffectPipeline::new(),
            policy,
        }
    }

    /// Copy the active room and rebuild the derived arrays
    pub fn refresh(&mut self, store: &SceneStore) {
        let clear_dirty = self.policy == RefreshPolicy::ClearOnRefresh;
        self.room = store.snapshot_active_room(clear_dirty);

        self.orderer.sort(&mut self.room.devices);
        self.layout.sample(&self.room.devices);

        self.colors.clear();
        self.colors.resize(self.layout.len(), BLANK);

        self.dirty.mark_all();

        debug!(
            "refreshed room `{}`: {} devices, {} lights, {} effects",
            self.room.name,
            self.room.devices.len(),
            self.layout.len(),
            self.room.effects.len()
        );
    }

    /// Refresh if the store is dirty, then run the room's effects
    pub fn render(&mut self, store: &SceneStore, delta: Duration) -> PipelineReport {
        if store.is_dirty() {
            self.refresh(store);
        }

        let effects = self.pipeline.run(
            &self.room.effects,
            delta,
            self.layout.boxes(),
            &mut self.colors,
        );
        self.dirty.colors = true;
        effects
    }

    /// Hand the current frame to `dispatch` and return the flags it was sent with.
    ///
    /// Dirty flags are cleared only when dispatch succeeds, so a failed
    /// frame is resent as changed. A panicking dispatch counts as failed.
    pub fn dispatch(&mut self, dispatch: &mut dyn DeviceDispatch) -> DirtyFlags {
        let dirty = self.dirty;
        let update = LightUpdate {
            boxes: self.layout.boxes(),
            devices: self.layout.devices(),
            colors: &self.colors,
            dirty,
        };

        let result = catch_unwind(AssertUnwindSafe(|| dispatch.dispatch(&update)))
            .unwrap_or_else(|payload| {
                Err(DispatchError::Panicked {
                    target: "dispatch".to_string(),
                    message: panic_message(&*payload),
                })
            });
        match result {
            Ok(()) => self.dirty.clear(),
            Err(err) => warn!("frame dispatch failed: {}", err),
        }

        dirty
    }

    /// Run one full tick: [`render`](Self::render) then [`dispatch`](Self::dispatch)
    pub fn tick(
        &mut self,
        store: &SceneStore,
        delta: Duration,
        dispatch: &mut dyn DeviceDispatch,
    ) -> TickReport {
        let effects = self.render(store, delta);
        let dirty = self.dispatch(dispatch);
        TickReport { dirty, effects }
    }

    pub fn room(&self) -> &Room {
        &self.room
    }

    pub fn boxes(&self) -> &[LightBox] {
        self.layout.boxes()
    }

    pub fn devices(&self) -> &[DeviceRef] {
        self.layout.devices()
    }

    pub fn colors(&self) -> &[Rgb] {
        &self.colors
    }

    /// Flags pending for the next dispatch
    pub fn dirty(&self) -> DirtyFlags {
        self.dirty
    }

    /// Total failed effect invocations
    pub fn effect_failures(&self) -> u64 {
        self.pipeline.failures()
    }
}
