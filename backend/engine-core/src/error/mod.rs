pub mod config;
pub mod frame_ring;
pub mod spawn;
pub mod transport;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    FrameRing(#[from] frame_ring::FrameRingError),

    #[error(transparent)]
    Transport(#[from] transport::TransportError),

    #[error(transparent)]
    Spawn(#[from] spawn::SpawnError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}
