mod error;
mod frame_ring;
mod health;
mod relay;
mod support;
mod supervisor;
