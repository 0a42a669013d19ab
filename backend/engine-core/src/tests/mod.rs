mod announcement;
mod config;
mod export;
mod frame_ring;
mod miss_counter;
mod protocol;
mod render;
mod request_slot;
mod spawn;
