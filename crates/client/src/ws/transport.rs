//! Transport seam between the reconnecting socket and an actual WebSocket.
//!
//! A [`Connector`] opens one physical connection and hands back its two
//! halves. The socket driver never reuses a connection: every reconnect asks
//! the connector for a fresh pair.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{future, Sink, SinkExt, Stream, StreamExt};
use thiserror::Error;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        self,
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message,
    },
};

/// A frame as seen by the socket driver. Binary frames and pings never get here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("connection closed")]
    Closed,
    #[error("{0}")]
    Other(String),
}

pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// Write and read halves of one open connection.
pub struct Transport {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a connection to `url`. Resolves once the connection is open.
    async fn connect(&self, url: &str) -> Result<Transport, TransportError>;
}

/// Native connector backed by tokio-tungstenite.
#[derive(Debug, Clone, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<Transport, TransportError> {
        let (ws_stream, _response) = connect_async(url).await?;
        let (write, read) = ws_stream.split();

        let sink = write
            .sink_map_err(TransportError::from)
            .with(|frame: Frame| future::ready(Ok::<_, TransportError>(into_message(frame))));

        let stream = read.filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(Ok(Frame::Text(text.as_str().to_owned()))),
                Ok(Message::Close(frame)) => Some(Ok(match frame {
                    Some(frame) => Frame::Close {
                        code: u16::from(frame.code),
                        reason: frame.reason.as_str().to_owned(),
                    },
                    None => Frame::Close {
                        code: 1005,
                        reason: String::new(),
                    },
                })),
                Ok(Message::Ping(data)) => {
                    // Pong is handled automatically by tungstenite
                    tracing::trace!("Received ping: {:?}", data);
                    None
                }
                // Ignore binary, pong, etc.
                Ok(_) => None,
                Err(e) => Some(Err(TransportError::from(e))),
            })
        });

        Ok(Transport {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

fn into_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::text(text),
        Frame::Close { code, reason } => Message::Close(Some(CloseFrame {
            code: CloseCode::from(code),
            reason: reason.into(),
        })),
    }
}
