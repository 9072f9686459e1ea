mod client;

pub use live_voice_types as types;
pub use client::{ClientConfig, ClientConfigBuilder, LiveSession, ServerRx, SessionEvent, Stats, Status, DEFAULT_MODEL};

#[cfg(feature = "utils")]
pub use live_voice_utils as utils;
