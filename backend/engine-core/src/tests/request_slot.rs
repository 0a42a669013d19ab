use crate::error::transport::TransportError;
use crate::transport::{RequestChannel, RequestSlot, SlotState};

use std::time::Duration;

use futures_util::future::BoxFuture;

/// Replies with the request text, or never replies when `hang` is set.
struct EchoChannel {
    hang: bool,
}

impl RequestChannel for EchoChannel {
    fn round_trip(&mut self, request: String) -> BoxFuture<'_, Result<String, TransportError>> {
        let hang = self.hang;
        Box::pin(async move {
            if hang {
                std::future::pending::<()>().await;
            }
            Ok(request)
        })
    }
}

struct FailingChannel;

impl RequestChannel for FailingChannel {
    fn round_trip(&mut self, _request: String) -> BoxFuture<'_, Result<String, TransportError>> {
        Box::pin(async { Err(TransportError::io("connection reset")) })
    }
}

/// **VALUE**: Verifies a completed round trip returns the slot to idle.
#[tokio::test]
async fn given_idle_slot_when_reply_arrives_then_slot_is_idle_again() {
    let mut slot = RequestSlot::new(Box::new(EchoChannel { hang: false }));

    let reply = slot.request("hello".into(), Duration::from_secs(1)).await;

    assert_eq!(reply.unwrap(), "hello");
    assert_eq!(slot.state(), SlotState::Idle);
    assert!(slot.is_reusable());
}

/// **VALUE**: Verifies a timed out request leaves the slot unusable.
///
/// **WHY THIS MATTERS**: The late reply may still arrive; reusing the socket would hand that
/// stale reply to the next request.
///
/// **BUG THIS CATCHES**: Would catch resetting the slot to idle on timeout.
#[tokio::test(start_paused = true)]
async fn given_no_reply_when_timeout_elapses_then_slot_stays_awaiting_response() {
    // GIVEN: A channel that never answers
    let mut slot = RequestSlot::new(Box::new(EchoChannel { hang: true }));

    // WHEN: The request times out
    let result = slot.request("hello".into(), Duration::from_millis(50)).await;

    // THEN: Timeout reported and the slot refuses further requests
    assert!(matches!(result, Err(ref e) if e.is_timeout()));
    assert_eq!(slot.state(), SlotState::AwaitingResponse);
    assert!(!slot.is_reusable());
}

/// **VALUE**: Verifies a second request on an unanswered slot is rejected as busy.
///
/// **BUG THIS CATCHES**: Would catch sending two requests on one strictly alternating socket.
#[tokio::test(start_paused = true)]
async fn given_awaiting_slot_when_requested_again_then_returns_busy() {
    let mut slot = RequestSlot::new(Box::new(EchoChannel { hang: true }));
    let _ = slot.request("first".into(), Duration::from_millis(10)).await;

    let result = slot.request("second".into(), Duration::from_millis(10)).await;

    assert!(matches!(result, Err(TransportError::Busy { .. })));
}

/// **VALUE**: Verifies a transport error also leaves the slot unusable.
#[tokio::test]
async fn given_channel_error_when_requested_then_error_is_returned_and_slot_not_reusable() {
    let mut slot = RequestSlot::new(Box::new(FailingChannel));

    let result = slot.request("hello".into(), Duration::from_secs(1)).await;

    assert!(matches!(result, Err(TransportError::Io { .. })));
    assert!(!slot.is_reusable());
}
