//! WebSocket transport.

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use trellis_types::{RealtimeEvent, TransportError};
use urlencoding::encode;

use super::{Transport, TransportConnection};

/// Connects to the server's realtime endpoint and yields events from JSON
/// text frames. Unparseable frames are logged and skipped, not fatal: one
/// malformed message must not cost the whole connection.
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    /// `url` is the websocket endpoint, e.g. `wss://host/realtime`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, principal_id: &str) -> String {
        format!("{}?principal={}", self.url, encode(principal_id))
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(
        &self,
        principal_id: &str,
    ) -> Result<Box<dyn TransportConnection>, TransportError> {
        let endpoint = self.endpoint(principal_id);
        debug!("dialing {}", endpoint);
        let (stream, _response) = connect_async(&endpoint)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl TransportConnection for WsConnection {
    async fn recv(&mut self) -> Option<RealtimeEvent> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => match serde_json::from_str::<RealtimeEvent>(&text) {
                    Ok(event) => return Some(event),
                    Err(e) => {
                        warn!("skipping unparseable realtime frame: {}", e);
                    }
                },
                Ok(Message::Close(frame)) => {
                    debug!("websocket closed: {:?}", frame);
                    return None;
                }
                // Pings are answered by tungstenite; nothing to surface.
                Ok(_) => {}
                Err(e) => {
                    warn!("websocket receive error: {}", e);
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_carries_encoded_principal() {
        let transport = WebSocketTransport::new("ws://localhost:4000/realtime/");
        assert_eq!(
            transport.endpoint("user a"),
            "ws://localhost:4000/realtime?principal=user%20a"
        );
    }
}
