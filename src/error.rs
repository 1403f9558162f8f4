use core::any::Any;

use thiserror::Error;

use crate::device::ProviderType;

/// Error reported by a single effect invocation
#[derive(Debug, Error)]
pub enum EffectError {
    #[error("color buffer holds {colors} lights but {boxes} boxes were given")]
    LayoutMismatch { boxes: usize, colors: usize },
    #[error("effect `{effect}` panicked: {message}")]
    Panicked { effect: String, message: String },
    #[error("{0}")]
    Failed(String),
}

/// Error reported while delivering colors to devices
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no provider registered for `{0}`")]
    UnknownProvider(ProviderType),
    #[error("transport failure on device `{device}`: {reason}")]
    Transport { device: String, reason: String },
    #[error("`{target}` panicked: {message}")]
    Panicked { target: String, message: String },
}

/// Error returned by the render scheduler control surface
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to spawn render thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Message carried by a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_default()
}
