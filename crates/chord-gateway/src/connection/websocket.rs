//! WebSocket transport over tokio-tungstenite

use super::{CloseFrame, Connector, Frame, FrameSink, FrameStream, TransportError, TransportPair};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as WsCloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens `ws://` and `wss://` connections
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    user_agent: String,
}

impl WebSocketConnector {
    #[must_use]
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
        }
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(chord_common::user_agent())
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<TransportPair, TransportError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        if let Ok(value) = HeaderValue::from_str(&self.user_agent) {
            request.headers_mut().insert("User-Agent", value);
        }

        let (ws, response) = connect_async(request)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        tracing::debug!(url = %url, status = %response.status(), "WebSocket connected");

        let (sink, stream) = ws.split();
        Ok(TransportPair {
            sink: Box::new(WsSink(sink)),
            stream: Box::new(WsFrames(stream)),
        })
    }
}

struct WsSink(SplitSink<WsStream, Message>);

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(data) => Message::Binary(data),
            Frame::Ping(data) => Message::Ping(data),
            Frame::Pong(data) => Message::Pong(data),
            Frame::Close(close) => Message::Close(close.map(to_ws_close)),
        };
        self.0.send(message).await.map_err(map_error)
    }

    async fn close(&mut self, frame: Option<CloseFrame>) -> Result<(), TransportError> {
        match self.0.send(Message::Close(frame.map(to_ws_close))).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(map_error(e)),
        }
    }
}

struct WsFrames(SplitStream<WsStream>);

#[async_trait]
impl FrameStream for WsFrames {
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        loop {
            let frame = match self.0.next().await? {
                Ok(Message::Text(text)) => Frame::Text(text),
                Ok(Message::Binary(data)) => Frame::Binary(data),
                Ok(Message::Ping(data)) => Frame::Ping(data),
                Ok(Message::Pong(data)) => Frame::Pong(data),
                Ok(Message::Close(close)) => Frame::Close(close.map(|f| CloseFrame {
                    code: u16::from(f.code),
                    reason: f.reason.into_owned(),
                })),
                // Raw frames never surface when reading messages
                Ok(Message::Frame(_)) => continue,
                Err(WsError::ConnectionClosed) => return None,
                Err(e) => return Some(Err(map_error(e))),
            };
            return Some(Ok(frame));
        }
    }
}

fn to_ws_close(frame: CloseFrame) -> WsCloseFrame<'static> {
    WsCloseFrame {
        code: WsCloseCode::from(frame.code),
        reason: frame.reason.into(),
    }
}

fn map_error(err: WsError) -> TransportError {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
        other => TransportError::Io(other.to_string()),
    }
}
