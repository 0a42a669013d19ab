pub mod config;
pub mod error;
pub mod events;
pub mod frame_ring;
pub mod health;
pub mod protocol;
pub mod relay;
pub mod session;
pub mod supervisor;
pub mod task;
pub mod transport;

#[cfg(test)]
mod tests;

pub const ENGINE_BINARY: &str = "entropic-engine";
pub const ENGINE_HOSTNAME: &str = "127.0.0.1";
pub const ENGINE_WS_BASE_URL: &str = const_format::concatcp!("ws://", ENGINE_HOSTNAME);

/// Environment override for the frame file when the engine does not announce one.
pub const SHM_PATH_ENV: &str = "ENTROPIC_SHM_PATH";
