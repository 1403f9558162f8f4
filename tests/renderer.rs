mod tests {
    use core::cmp::Ordering;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use room_light_composer::effect::StaticColorEffect;
    use room_light_composer::{
        Device, DeviceDispatch, DeviceInRoom, DeviceRef, DirtyFlags, DispatchError, Duration,
        Effect, EffectError, LightBox, LightUpdate, Provider, ProviderDispatch, ProviderRegistry,
        ProviderType, RefreshPolicy, RenderState, Rgb, Room, SceneStore, Vec3, effect_handle,
    };

    const STRIP: ProviderType = ProviderType::new("strip");
    const BULB: ProviderType = ProviderType::new("bulb");

    const WARM: Rgb = Rgb {
        r: 255,
        g: 180,
        b: 100,
    };
    const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    struct Light {
        name: &'static str,
        tag: ProviderType,
        lights: usize,
    }

    impl Device for Light {
        fn name(&self) -> &str {
            self.name
        }

        fn provider_type(&self) -> ProviderType {
            self.tag
        }

        #[allow(clippy::cast_precision_loss)]
        fn light_bounding_boxes(&self) -> Vec<LightBox> {
            (0..self.lights)
                .map(|i| LightBox::around(Vec3::new(i as f32, 0.0, 0.0), Vec3::ONE))
                .collect()
        }
    }

    fn light(name: &'static str, tag: ProviderType, lights: usize) -> DeviceInRoom {
        DeviceInRoom::new(Arc::new(Light { name, tag, lights }))
    }

    /// Device whose geometry query always panics
    struct Uncalibrated;

    impl Device for Uncalibrated {
        fn name(&self) -> &str {
            "uncalibrated"
        }

        fn provider_type(&self) -> ProviderType {
            BULB
        }

        fn light_bounding_boxes(&self) -> Vec<LightBox> {
            panic!("no calibration data")
        }
    }

    /// Keeps the dirty flags and light count of every dispatched frame
    #[derive(Default)]
    struct Recording {
        frames: Vec<DirtyFlags>,
        lights: Vec<usize>,
        fail: bool,
        panic: bool,
    }

    impl DeviceDispatch for Recording {
        fn dispatch(&mut self, update: &LightUpdate<'_>) -> Result<(), DispatchError> {
            self.frames.push(update.dirty);
            self.lights.push(if update.is_empty() { 0 } else { update.len() });
            if self.panic {
                panic!("bridge gone");
            }
            if self.fail {
                return Err(DispatchError::Transport {
                    device: "bridge".into(),
                    reason: "timeout".into(),
                });
            }
            Ok(())
        }
    }

    type Writes = Arc<Mutex<Vec<(String, usize, Vec<Rgb>)>>>;

    /// Collects every device write
    struct Collecting {
        writes: Writes,
    }

    impl Provider for Collecting {
        fn compare(&self, a: &DeviceInRoom, b: &DeviceInRoom) -> Ordering {
            a.device.name().cmp(b.device.name())
        }

        fn write(
            &self,
            device: &DeviceRef,
            boxes: &[LightBox],
            colors: &[Rgb],
            _dirty: DirtyFlags,
        ) -> Result<(), DispatchError> {
            self.writes
                .lock()
                .push((device.name().to_string(), boxes.len(), colors.to_vec()));
            Ok(())
        }
    }

    /// Provider whose every call panics
    struct Faulty;

    impl Provider for Faulty {
        fn compare(&self, _a: &DeviceInRoom, _b: &DeviceInRoom) -> Ordering {
            panic!("comparator fault")
        }

        fn write(
            &self,
            _device: &DeviceRef,
            _boxes: &[LightBox],
            _colors: &[Rgb],
            _dirty: DirtyFlags,
        ) -> Result<(), DispatchError> {
            panic!("bus fault")
        }
    }

    /// Effect that always reports an error
    struct Refusing;

    impl Effect for Refusing {
        fn name(&self) -> &str {
            "refusing"
        }

        fn tick(&mut self, _delta: Duration) {}

        fn update(&mut self, _boxes: &[LightBox], _colors: &mut [Rgb]) -> Result<(), EffectError> {
            Err(EffectError::Failed("not today".into()))
        }
    }

    fn render_state() -> RenderState {
        RenderState::new(ProviderRegistry::new(), RefreshPolicy::ClearOnRefresh)
    }

    const DELTA: Duration = Duration::from_micros(16_670);

    #[test]
    fn test_single_device_static_color_scenario() {
        let room = Room::new("desk")
            .with_device(light("strip", STRIP, 3))
            .with_effect(effect_handle(StaticColorEffect::new(WARM)));
        let store = SceneStore::with_rooms(vec![room], 0);
        let mut state = render_state();
        state.refresh(&store);

        state.tick(&store, DELTA, &mut Recording::default());

        assert_eq!(state.colors(), [WARM; 3]);
        assert_eq!(state.devices().len(), 3);
        let owner = &state.devices()[0];
        assert!(state.devices().iter().all(|d| Arc::ptr_eq(d, owner)));
    }

    #[test]
    fn test_colors_match_layout_after_refresh() {
        let store = SceneStore::with_rooms(
            vec![
                Room::new("a")
                    .with_device(light("s1", STRIP, 4))
                    .with_device(light("b1", BULB, 1)),
            ],
            0,
        );
        let mut state = render_state();
        state.refresh(&store);
        assert_eq!(state.colors(), [BLACK; 5]);
        assert_eq!(state.boxes().len(), 5);

        {
            let mut writer = store.begin_write();
            writer.rooms_mut()[0].devices.push(light("s2", STRIP, 2));
        }
        state.tick(&store, DELTA, &mut Recording::default());

        assert_eq!(state.colors().len(), 7);
        assert_eq!(state.boxes().len(), 7);
        assert_eq!(state.devices().len(), 7);
    }

    #[test]
    fn test_out_of_range_index_renders_empty_room() {
        let room = Room::new("desk")
            .with_device(light("strip", STRIP, 3))
            .with_effect(effect_handle(StaticColorEffect::new(WARM)));
        let store = SceneStore::with_rooms(vec![room], 0);
        let mut state = render_state();
        state.refresh(&store);

        store.begin_write().set_active_room_index(3);
        let report = state.tick(&store, DELTA, &mut Recording::default());

        assert!(state.room().devices.is_empty());
        assert!(state.room().effects.is_empty());
        assert!(state.colors().is_empty());
        assert_eq!(report.effects.invoked, 0);
    }

    #[test]
    fn test_devices_are_ordered_before_sampling() {
        let registry = ProviderRegistry::new().with_provider(
            STRIP,
            Collecting {
                writes: Writes::default(),
            },
        );
        let store = SceneStore::with_rooms(
            vec![
                Room::new("a")
                    .with_device(light("s-b", STRIP, 1))
                    .with_device(light("bulb", BULB, 1))
                    .with_device(light("s-a", STRIP, 1)),
            ],
            0,
        );
        let mut state = RenderState::new(registry, RefreshPolicy::ClearOnRefresh);
        state.refresh(&store);

        let owners: Vec<&str> = state.devices().iter().map(|d| d.name()).collect();
        assert_eq!(owners, ["bulb", "s-a", "s-b"]);
    }

    #[test]
    fn test_dirty_flags_per_tick() {
        let store = SceneStore::with_rooms(vec![Room::new("a").with_device(light("s", STRIP, 2))], 0);
        let mut state = render_state();
        let mut dispatch = Recording::default();
        state.refresh(&store);

        state.tick(&store, DELTA, &mut dispatch);
        state.tick(&store, DELTA, &mut dispatch);
        store.begin_write().set_active_room_index(0);
        state.tick(&store, DELTA, &mut dispatch);

        let colors_only = DirtyFlags {
            colors: true,
            ..DirtyFlags::default()
        };
        assert_eq!(
            dispatch.frames,
            [DirtyFlags::ALL, colors_only, DirtyFlags::ALL]
        );
        assert_eq!(state.dirty(), DirtyFlags::default());
    }

    #[test]
    fn test_failed_dispatch_keeps_flags() {
        let store = SceneStore::with_rooms(vec![Room::new("a").with_device(light("s", STRIP, 2))], 0);
        let mut state = render_state();
        let mut dispatch = Recording {
            fail: true,
            ..Recording::default()
        };
        state.refresh(&store);

        state.tick(&store, DELTA, &mut dispatch);
        state.tick(&store, DELTA, &mut dispatch);

        assert_eq!(dispatch.frames, [DirtyFlags::ALL, DirtyFlags::ALL]);
    }

    #[test]
    fn test_clear_on_refresh_copies_once_per_write() {
        let store = SceneStore::with_rooms(vec![Room::new("a")], 0);
        let mut state = render_state();
        state.refresh(&store);

        store.begin_write().set_active_room_index(0);
        assert!(store.is_dirty());
        state.tick(&store, DELTA, &mut Recording::default());
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_always_refresh_never_clears_marker() {
        let store = SceneStore::with_rooms(vec![Room::new("a").with_device(light("s", STRIP, 1))], 0);
        let mut state = RenderState::new(ProviderRegistry::new(), RefreshPolicy::AlwaysRefresh);
        let mut dispatch = Recording::default();
        state.refresh(&store);

        store.begin_write().set_active_room_index(0);
        state.tick(&store, DELTA, &mut dispatch);
        state.tick(&store, DELTA, &mut dispatch);

        assert!(store.is_dirty());
        assert_eq!(dispatch.frames[1], DirtyFlags::ALL);
    }

    #[test]
    fn test_effect_state_survives_refresh() {
        let effect = Arc::new(Mutex::new(StaticColorEffect::new(WARM)));
        let store = SceneStore::with_rooms(
            vec![
                Room::new("a")
                    .with_device(light("s", STRIP, 2))
                    .with_effect(effect.clone()),
            ],
            0,
        );
        let mut state = render_state();
        state.refresh(&store);

        effect.lock().set_color(BLACK);
        store.begin_write().set_active_room_index(0);
        state.tick(&store, DELTA, &mut Recording::default());

        assert_eq!(state.colors(), [BLACK; 2]);
    }

    #[test]
    fn test_provider_dispatch_groups_by_device() {
        let writes = Writes::default();
        let registry = ProviderRegistry::new().with_provider(
            STRIP,
            Collecting {
                writes: Arc::clone(&writes),
            },
        );
        let store = SceneStore::with_rooms(
            vec![
                Room::new("a")
                    .with_device(light("s-b", STRIP, 1))
                    .with_device(light("s-a", STRIP, 2))
                    .with_effect(effect_handle(StaticColorEffect::new(WARM))),
            ],
            0,
        );
        let mut state = RenderState::new(registry.clone(), RefreshPolicy::ClearOnRefresh);
        state.refresh(&store);

        state.tick(&store, DELTA, &mut ProviderDispatch::new(registry));

        let writes = writes.lock();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], ("s-a".to_string(), 2, vec![WARM; 2]));
        assert_eq!(writes[1], ("s-b".to_string(), 1, vec![WARM]));
    }

    #[test]
    fn test_provider_dispatch_reports_unknown_provider() {
        let store = SceneStore::with_rooms(
            vec![
                Room::new("a")
                    .with_device(light("b", BULB, 1))
                    .with_device(light("s", STRIP, 1)),
            ],
            0,
        );
        let writes = Writes::default();
        let registry = ProviderRegistry::new().with_provider(
            STRIP,
            Collecting {
                writes: Arc::clone(&writes),
            },
        );
        let mut state = RenderState::new(registry.clone(), RefreshPolicy::ClearOnRefresh);
        state.refresh(&store);

        let mut dispatch = ProviderDispatch::new(registry);
        state.tick(&store, DELTA, &mut dispatch);

        // The strip still gets its colors, and the failed frame stays dirty
        assert_eq!(writes.lock().len(), 1);
        assert_eq!(state.dirty(), DirtyFlags::ALL);
    }

    #[test]
    fn test_panicking_provider_spares_other_devices() {
        let writes = Writes::default();
        let registry = ProviderRegistry::new()
            .with_provider(
                STRIP,
                Collecting {
                    writes: Arc::clone(&writes),
                },
            )
            .with_provider(BULB, Faulty);
        let store = SceneStore::with_rooms(
            vec![
                Room::new("a")
                    .with_device(light("b", BULB, 1))
                    .with_device(light("s", STRIP, 2))
                    .with_effect(effect_handle(StaticColorEffect::new(WARM))),
            ],
            0,
        );
        let mut state = RenderState::new(registry.clone(), RefreshPolicy::ClearOnRefresh);
        state.refresh(&store);

        let mut dispatch = ProviderDispatch::new(registry);
        state.tick(&store, DELTA, &mut dispatch);
        state.tick(&store, DELTA, &mut dispatch);

        let writes = writes.lock();
        assert_eq!(writes.len(), 2);
        assert!(writes.iter().all(|write| *write == ("s".to_string(), 2, vec![WARM; 2])));
        assert_eq!(state.dirty(), DirtyFlags::ALL);
    }

    #[test]
    fn test_panicking_dispatch_counts_as_failed() {
        let store = SceneStore::with_rooms(vec![Room::new("a").with_device(light("s", STRIP, 2))], 0);
        let mut state = render_state();
        state.refresh(&store);

        let mut dispatch = Recording {
            panic: true,
            ..Recording::default()
        };
        state.tick(&store, DELTA, &mut dispatch);
        assert_eq!(state.dirty(), DirtyFlags::ALL);

        dispatch.panic = false;
        state.tick(&store, DELTA, &mut dispatch);
        assert_eq!(dispatch.frames, [DirtyFlags::ALL, DirtyFlags::ALL]);
        assert_eq!(state.dirty(), DirtyFlags::default());
    }

    #[test]
    fn test_panicking_comparator_keeps_every_device() {
        let registry = ProviderRegistry::new().with_provider(BULB, Faulty);
        let store = SceneStore::with_rooms(
            vec![
                Room::new("a")
                    .with_device(light("b1", BULB, 1))
                    .with_device(light("b2", BULB, 1))
                    .with_device(light("b3", BULB, 1)),
            ],
            0,
        );
        let mut state = RenderState::new(registry, RefreshPolicy::ClearOnRefresh);
        state.refresh(&store);

        let mut owners: Vec<&str> = state.devices().iter().map(|d| d.name()).collect();
        owners.sort_unstable();
        assert_eq!(owners, ["b1", "b2", "b3"]);
        assert_eq!(state.colors().len(), 3);
    }

    #[test]
    fn test_device_with_panicking_geometry_is_skipped() {
        let store = SceneStore::with_rooms(
            vec![
                Room::new("a")
                    .with_device(DeviceInRoom::new(Arc::new(Uncalibrated)))
                    .with_device(light("s", STRIP, 2))
                    .with_effect(effect_handle(StaticColorEffect::new(WARM))),
            ],
            0,
        );
        let mut state = render_state();
        let mut dispatch = Recording::default();
        state.refresh(&store);

        state.tick(&store, DELTA, &mut dispatch);

        assert_eq!(state.colors(), [WARM; 2]);
        assert!(state.devices().iter().all(|d| d.name() == "s"));
        assert_eq!(dispatch.lights, [2]);
    }

    #[test]
    fn test_render_and_dispatch_steps() {
        let store = SceneStore::with_rooms(
            vec![
                Room::new("a")
                    .with_device(light("s", STRIP, 3))
                    .with_effect(effect_handle(StaticColorEffect::new(WARM))),
            ],
            0,
        );
        let mut state = render_state();
        let mut dispatch = Recording::default();
        state.refresh(&store);

        let effects = state.render(&store, DELTA);
        assert_eq!(effects.invoked, 1);
        assert_eq!(state.colors(), [WARM; 3]);
        assert!(dispatch.frames.is_empty());

        let sent = state.dispatch(&mut dispatch);
        assert_eq!(sent, DirtyFlags::ALL);
        assert_eq!(dispatch.lights, [3]);
        assert_eq!(state.dirty(), DirtyFlags::default());
    }

    #[test]
    fn test_empty_room_dispatches_empty_frame() {
        let store = SceneStore::with_rooms(vec![Room::new("empty")], 0);
        let mut state = render_state();
        let mut dispatch = Recording::default();
        state.refresh(&store);

        state.tick(&store, DELTA, &mut dispatch);

        assert_eq!(dispatch.lights, [0]);
        assert_eq!(dispatch.frames, [DirtyFlags::ALL]);
    }

    #[test]
    fn test_device_groups_start_indices() {
        let store = SceneStore::with_rooms(
            vec![
                Room::new("a")
                    .with_device(light("s", STRIP, 2))
                    .with_device(light("b", BULB, 1))
                    .with_device(light("t", STRIP, 3)),
            ],
            0,
        );
        let mut state = render_state();
        state.refresh(&store);

        let update = LightUpdate {
            boxes: state.boxes(),
            devices: state.devices(),
            colors: state.colors(),
            dirty: state.dirty(),
        };
        assert_eq!(update.len(), 6);

        let groups: Vec<(&str, usize, usize)> = update
            .device_groups()
            .map(|group| (group.device.name(), group.start, group.colors.len()))
            .collect();
        assert_eq!(groups, [("b", 0, 1), ("s", 1, 2), ("t", 3, 3)]);
    }

    #[test]
    fn test_effect_failures_accumulate() {
        let store = SceneStore::with_rooms(
            vec![
                Room::new("a")
                    .with_device(light("s", STRIP, 1))
                    .with_effect(effect_handle(Refusing))
                    .with_effect(effect_handle(StaticColorEffect::new(WARM))),
            ],
            0,
        );
        let mut state = render_state();
        state.refresh(&store);

        let report = state.tick(&store, DELTA, &mut Recording::default());
        state.tick(&store, DELTA, &mut Recording::default());

        assert_eq!(report.effects.invoked, 2);
        assert_eq!(report.effects.failed, 1);
        assert_eq!(state.effect_failures(), 2);
        assert_eq!(state.colors(), [WARM]);
    }
}
