use crate::error::transport::TransportError;
use crate::protocol::{self, EngineCommand, PING, PingReply};
use crate::session::EngineSession;
use crate::transport::{Connector, RequestSlot};

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::time::timeout as TokioTimeout;
use uuid::Uuid;

/// Liveness pings on the sidecar's dedicated health port.
///
/// Kept apart from the control connection so a long render on the control
/// socket cannot delay a ping. Any failure discards the connection.
pub struct HealthProbe {
    connector: Arc<dyn Connector>,
    slot: Option<(u64, RequestSlot)>,
}

impl HealthProbe {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            slot: None,
        }
    }

    /// Ping `session`, connecting first if needed. `timeout` bounds the whole
    /// exchange including the connect.
    pub async fn ping(
        &mut self,
        session: &EngineSession,
        timeout: Duration,
    ) -> Result<PingReply, TransportError> {
        let result = match TokioTimeout(timeout, self.exchange(session, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::timeout("health ping", timeout)),
        };

        if result.is_err() {
            self.slot = None;
        }
        result
    }

    async fn exchange(
        &mut self,
        session: &EngineSession,
        timeout: Duration,
    ) -> Result<PingReply, TransportError> {
        let generation = session.generation();
        let mut slot = match self.slot.take() {
            Some((slot_generation, slot)) if slot_generation == generation => slot,
            _ => {
                let port = session.descriptor().health_port;
                debug!("Opening health connection on port {port}");
                RequestSlot::new(self.connector.connect(port).await?)
            }
        };

        let id = Uuid::new_v4().to_string();
        let request = protocol::encode_request(&EngineCommand::new(PING), &id, session.token())?;
        let raw = slot.request(request, timeout).await?;
        let reply = PingReply::from_response(&protocol::decode_response(&raw, &id)?)?;

        self.slot = Some((generation, slot));
        Ok(reply)
    }

    /// Drop the health connection.
    pub fn reset(&mut self) {
        self.slot = None;
    }

    pub fn is_connected(&self) -> bool {
        self.slot.is_some()
    }
}
