//! Fixed-rate render loop.
//!
//! [`FramePacer`] holds the tick-rate arithmetic; [`RenderScheduler`] owns
//! the render thread that drives a [`RenderState`] at that rate.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use embassy_time::{Duration, Instant};
use log::{debug, error, trace};
use parking_lot::Mutex;

use crate::device::ProviderRegistry;
use crate::dispatch::DeviceDispatch;
use crate::error::SchedulerError;
use crate::renderer::{RefreshPolicy, RenderState};
use crate::scene::SceneStore;

/// Default tick interval (~60 Hz).
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_micros(16_670);

/// Shortest sleep between ticks, even when a tick overruns.
pub const MIN_SLEEP: Duration = Duration::from_millis(1);

const RENDER_THREAD_NAME: &str = "room-render";

/// Configuration for the render scheduler
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub min_sleep: Duration,
    pub refresh_policy: RefreshPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            min_sleep: MIN_SLEEP,
            refresh_policy: RefreshPolicy::default(),
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    #[must_use]
    pub fn with_min_sleep(mut self, min_sleep: Duration) -> Self {
        self.min_sleep = min_sleep;
        self
    }

    #[must_use]
    pub fn with_refresh_policy(mut self, policy: RefreshPolicy) -> Self {
        self.refresh_policy = policy;
        self
    }
}

/// Timing of one finished tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameResult {
    /// Processing time of the tick
    pub elapsed: Duration,
    /// How long to sleep before the next tick (never below the minimum sleep)
    pub sleep_duration: Duration,
}

impl FrameResult {
    /// Whether the tick took longer than the interval
    pub const fn overran(&self, interval: Duration) -> bool {
        self.elapsed.as_ticks() > interval.as_ticks()
    }
}

/// Tick-rate arithmetic, independent of any clock or thread.
///
/// # Usage
///
/// ```ignore
/// let mut pacer = FramePacer::new(&config);
///
/// loop {
///     let start = Instant::now();
///     let delta = pacer.begin(start);
///     render(delta);
///     let frame = pacer.finish(start, Instant::now());
///     sleep(frame.sleep_duration);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FramePacer {
    tick_interval: Duration,
    min_sleep: Duration,
    last_start: Option<Instant>,
}

impl FramePacer {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            tick_interval: config.tick_interval,
            min_sleep: config.min_sleep,
            last_start: None,
        }
    }

    pub const fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Start a tick at `now` and return the delta since the previous start.
    ///
    /// The first tick has a zero delta.
    pub fn begin(&mut self, now: Instant) -> Duration {
        let delta = self
            .last_start
            .and_then(|last| now.checked_duration_since(last))
            .unwrap_or(Duration::from_ticks(0));
        self.last_start = Some(now);
        delta
    }

    /// Finish a tick started at `start` and compute the sleep until the next one
    pub fn finish(&self, start: Instant, end: Instant) -> FrameResult {
        let elapsed = end
            .checked_duration_since(start)
            .unwrap_or(Duration::from_ticks(0));
        let remaining = self
            .tick_interval
            .checked_sub(elapsed)
            .unwrap_or(Duration::from_ticks(0));

        FrameResult {
            elapsed,
            sleep_duration: remaining.max(self.min_sleep),
        }
    }
}

/// Everything the render thread owns or shares
struct RenderContext {
    store: Arc<SceneStore>,
    registry: ProviderRegistry,
    dispatch: Arc<Mutex<dyn DeviceDispatch>>,
    config: SchedulerConfig,
    stop: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
}

impl RenderContext {
    fn run(self) {
        let mut state = RenderState::new(self.registry, self.config.refresh_policy);
        state.refresh(&self.store);

        let mut pacer = FramePacer::new(&self.config);
        debug!(
            "render loop started, tick interval {} us",
            pacer.tick_interval().as_micros()
        );

        while !self.stop.load(Ordering::Acquire) {
            let start = Instant::now();
            let delta = pacer.begin(start);

            state.render(&self.store, delta);
            state.dispatch(&mut *self.dispatch.lock());
            self.ticks.fetch_add(1, Ordering::Relaxed);

            let frame = pacer.finish(start, Instant::now());
            if frame.overran(pacer.tick_interval()) {
                trace!("tick overran by {} us", (frame.elapsed - pacer.tick_interval()).as_micros());
            }
            thread::sleep(core::time::Duration::from_micros(frame.sleep_duration.as_micros()));
        }

        debug!("render loop stopped");
    }
}

/// Owner of the render thread.
///
/// `start` and `stop` are idempotent. The scheduler is stopped when dropped.
pub struct RenderScheduler {
    store: Arc<SceneStore>,
    registry: ProviderRegistry,
    dispatch: Arc<Mutex<dyn DeviceDispatch>>,
    config: SchedulerConfig,
    stop: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl RenderScheduler {
    /// Create a stopped scheduler with the default configuration
    pub fn new(
        store: Arc<SceneStore>,
        registry: ProviderRegistry,
        dispatch: impl DeviceDispatch + 'static,
    ) -> Self {
        Self::with_config(store, registry, dispatch, SchedulerConfig::default())
    }

    /// Create a stopped scheduler
    pub fn with_config(
        store: Arc<SceneStore>,
        registry: ProviderRegistry,
        dispatch: impl DeviceDispatch + 'static,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            registry,
            dispatch: Arc::new(Mutex::new(dispatch)),
            config,
            stop: Arc::new(AtomicBool::new(false)),
            ticks: Arc::new(AtomicU64::new(0)),
            thread: None,
        }
    }

    pub fn store(&self) -> &Arc<SceneStore> {
        &self.store
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Number of completed ticks across all runs
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Whether the render thread is alive
    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    /// Spawn the render thread. Does nothing if it is already running.
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        if self.is_running() {
            return Ok(());
        }
        // A thread that died on its own is reaped before respawning
        self.join();

        self.stop.store(false, Ordering::Release);
        let context = RenderContext {
            store: Arc::clone(&self.store),
            registry: self.registry.clone(),
            dispatch: Arc::clone(&self.dispatch),
            config: self.config,
            stop: Arc::clone(&self.stop),
            ticks: Arc::clone(&self.ticks),
        };

        let thread = thread::Builder::new()
            .name(RENDER_THREAD_NAME.into())
            .spawn(move || context.run())?;
        self.thread = Some(thread);

        Ok(())
    }

    /// Signal the render thread to stop and wait for it to exit.
    ///
    /// Does nothing if the scheduler is stopped. The loop checks the signal
    /// once per tick, so this blocks for up to one tick interval.
    pub fn stop(&mut self) {
        if self.thread.is_none() {
            return;
        }
        self.stop.store(true, Ordering::Release);
        self.join();
    }

    fn join(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.join().is_err() {
            error!("render thread panicked");
        }
    }
}

impl Drop for RenderScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
