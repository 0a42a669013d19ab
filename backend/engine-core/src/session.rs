//! Per-generation connection state.
//!
//! Every successful sidecar spawn produces a new [`EngineSession`]. The relay and
//! the health monitor receive sessions explicitly; nothing reads ports or tokens
//! from globals, so a new generation is a constructor call rather than a reset.

use common::RedactedToken;

use std::path::{Path, PathBuf};

/// Ports and token announced by one sidecar generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub control_port: u16,
    pub health_port: u16,
    pub auth_token: RedactedToken,
}

impl ConnectionDescriptor {
    pub fn new(control_port: u16, health_port: u16, auth_token: RedactedToken) -> Self {
        Self {
            control_port,
            health_port,
            auth_token,
        }
    }
}

/// One sidecar generation as seen by the host.
#[derive(Debug, Clone)]
pub struct EngineSession {
    generation: u64,
    descriptor: ConnectionDescriptor,
    shm_path: Option<PathBuf>,
    pid: Option<u32>,
}

impl EngineSession {
    pub fn new(generation: u64, descriptor: ConnectionDescriptor) -> Self {
        Self {
            generation,
            descriptor,
            shm_path: None,
            pid: None,
        }
    }

    pub fn with_shm_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.shm_path = Some(path.into());
        self
    }

    pub fn with_pid(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    pub fn token(&self) -> &RedactedToken {
        &self.descriptor.auth_token
    }

    pub fn shm_path(&self) -> Option<&Path> {
        self.shm_path.as_deref()
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}
