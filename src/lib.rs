pub mod color;
pub mod device;
pub mod dispatch;
pub mod effect;
pub mod error;
pub mod frame_scheduler;
pub mod geometry;
pub mod ordering;
pub mod renderer;
pub mod scene;

pub use device::{Device, DeviceRef, Provider, ProviderRegistry, ProviderType};
pub use dispatch::{DeviceDispatch, DirtyFlags, LightUpdate, NullDispatch, ProviderDispatch};
pub use effect::{Effect, EffectHandle, EffectPipeline, PipelineReport, effect_handle};
pub use error::{DispatchError, EffectError, SchedulerError};
pub use frame_scheduler::{FramePacer, FrameResult, RenderScheduler, SchedulerConfig};
pub use geometry::{LightBox, LightLayout};
pub use ordering::DeviceOrderer;
pub use renderer::{RefreshPolicy, RenderState, TickReport};
pub use scene::{DeviceInRoom, Placement, Room, RoomsView, SceneStore, SceneWriter};

pub use color::Rgb;
pub use embassy_time::{Duration, Instant};
pub use glam::Vec3;
