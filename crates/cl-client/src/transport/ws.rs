//! WebSocket transport

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use cl_protocol::ClientCloseCode;

use super::{Connector, Transport, TransportError, TransportEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens WebSocket connections to a fixed URL
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
        tracing::debug!("Opening WebSocket to {}", self.url);
        let (stream, _response) = connect_async(self.url.as_str()).await.map_err(|e| {
            TransportError::Connect {
                url: self.url.clone(),
                message: e.to_string(),
            }
        })?;
        Ok(Box::new(WsTransport::new(stream)))
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

/// One open WebSocket connection
pub struct WsTransport {
    stream: WsStream,
    closed: bool,
}

impl WsTransport {
    pub fn new(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.stream.send(Message::text(frame)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<TransportEvent, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(TransportEvent::Frame(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(match String::from_utf8(data.to_vec()) {
                        Ok(text) => TransportEvent::Frame(text),
                        Err(_) => {
                            TransportEvent::Malformed("binary frame is not valid UTF-8".into())
                        }
                    });
                }
                Some(Ok(Message::Close(frame))) => {
                    self.closed = true;
                    return Ok(TransportEvent::Closed(frame.map(|f| u16::from(f.code))));
                }
                // Control frames are answered by tungstenite itself
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    self.closed = true;
                    return Ok(TransportEvent::Closed(None));
                }
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    async fn close(&mut self, code: ClientCloseCode) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let frame = (!code.is_reserved()).then(|| CloseFrame {
            code: CloseCode::from(code.as_u16()),
            reason: Default::default(),
        });
        match self.stream.close(frame).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
