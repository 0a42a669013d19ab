use crate::error::transport::TransportError;
use crate::transport::RequestChannel;

use std::time::Duration;

use log::trace;
use tokio::time::timeout as TokioTimeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    AwaitingResponse,
}

/// A [`RequestChannel`] that refuses a second request until the first has been
/// answered.
///
/// A request that fails or times out leaves the slot in
/// [`SlotState::AwaitingResponse`]: a late reply may still arrive on the
/// socket, so the only safe move is to discard the slot and reconnect.
pub struct RequestSlot {
    channel: Box<dyn RequestChannel>,
    state: SlotState,
}

impl RequestSlot {
    pub fn new(channel: Box<dyn RequestChannel>) -> Self {
        Self {
            channel,
            state: SlotState::Idle,
        }
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    /// Whether another request may be sent on this slot.
    pub fn is_reusable(&self) -> bool {
        self.state == SlotState::Idle
    }

    /// Send one request and wait up to `timeout` for its reply.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Busy`] if a previous request never got its reply
    /// - [`TransportError::Timeout`] if no reply arrived in time
    /// - any error from the underlying channel
    pub async fn request(
        &mut self,
        request: String,
        timeout: Duration,
    ) -> Result<String, TransportError> {
        if self.state == SlotState::AwaitingResponse {
            return Err(TransportError::busy(
                "previous request is still awaiting its reply",
            ));
        }

        self.state = SlotState::AwaitingResponse;
        let reply = TokioTimeout(timeout, self.channel.round_trip(request))
            .await
            .map_err(|_| TransportError::timeout("no reply from engine", timeout))??;

        trace!("Reply received ({} bytes)", reply.len());
        self.state = SlotState::Idle;
        Ok(reply)
    }
}
