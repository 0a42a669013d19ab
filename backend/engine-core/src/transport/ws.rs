use crate::ENGINE_WS_BASE_URL;
use crate::error::transport::TransportError;
use crate::transport::{Connector, RequestChannel};

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use log::{debug, trace};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

/// Connects to the sidecar's loopback WebSocket endpoints.
#[derive(Debug, Clone)]
pub struct WsConnector {
    base_url: String,
}

impl WsConnector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self, port: u16) -> Result<Url, TransportError> {
        Url::parse(&format!("{}:{port}", self.base_url)).map_err(|e| {
            TransportError::protocol(format!("invalid engine URL {}:{port}: {e}", self.base_url))
        })
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(ENGINE_WS_BASE_URL)
    }
}

impl Connector for WsConnector {
    fn connect(&self, port: u16) -> BoxFuture<'_, Result<Box<dyn RequestChannel>, TransportError>> {
        Box::pin(async move {
            let url = self.endpoint(port)?;
            debug!("Connecting to engine at {url}");

            let (stream, _) = connect_async(url.as_str()).await?;
            Ok(Box::new(WsChannel { stream }) as Box<dyn RequestChannel>)
        })
    }
}

/// Each request and reply is one JSON text frame.
pub struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsChannel {
    async fn next_reply(&mut self) -> Result<String, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.to_string()),
                Some(Ok(Message::Binary(bytes))) => {
                    return String::from_utf8(bytes.to_vec())
                        .map_err(|e| TransportError::protocol(format!("non UTF-8 reply: {e}")));
                }
                Some(Ok(Message::Close(frame))) => {
                    return Err(TransportError::io(format!(
                        "engine closed the connection: {frame:?}"
                    )));
                }
                Some(Ok(other)) => trace!("Ignoring control frame: {other:?}"),
                Some(Err(e)) => return Err(e.into()),
                None => return Err(TransportError::io("engine connection ended")),
            }
        }
    }
}

impl RequestChannel for WsChannel {
    fn round_trip(&mut self, request: String) -> BoxFuture<'_, Result<String, TransportError>> {
        Box::pin(async move {
            self.stream.send(Message::Text(request.into())).await?;
            self.next_reply().await
        })
    }
}
