//! Transport seam.
//!
//! [`Connector`] dials the session endpoint and yields a [`Transport`]. The
//! production pair runs over `tokio-tungstenite`; tests substitute an
//! in-memory pair.

use std::borrow::Cow;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::Result;

/// One inbound item from a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// The transport ended. `code` is the peer's close code, if one was sent.
    Closed { code: Option<u16> },
}

/// Bidirectional text transport.
#[async_trait]
pub trait Transport: Send + 'static {
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Next inbound frame. Must be cancel-safe.
    async fn recv(&mut self) -> Frame;

    async fn close(&mut self, code: u16) -> Result<()>;
}

/// Dials a transport for an endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    async fn connect(&self, endpoint: &Url) -> Result<Self::Transport>;
}

/// WebSocket connector.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    type Transport = WsTransport;

    async fn connect(&self, endpoint: &Url) -> Result<WsTransport> {
        let (stream, response) = connect_async(endpoint.as_str()).await?;
        tracing::debug!(status = %response.status(), endpoint = %endpoint, "websocket handshake complete");
        Ok(WsTransport { stream })
    }
}

/// WebSocket transport.
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Frame {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Frame::Text(text),
                Some(Ok(Message::Close(frame))) => {
                    return Frame::Closed {
                        code: frame.map(|f| u16::from(f.code)),
                    }
                }
                // Pings are answered by tungstenite; binary frames are not part of the protocol.
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "websocket receive error");
                    return Frame::Closed { code: None };
                }
                None => return Frame::Closed { code: None },
            }
        }
    }

    async fn close(&mut self, code: u16) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: Cow::Borrowed("client disconnect"),
        };
        self.stream.close(Some(frame)).await?;
        Ok(())
    }
}
