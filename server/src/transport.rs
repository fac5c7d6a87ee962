//! Framed full-duplex transport abstraction.
//!
//! The realtime core never touches HTTP: the upgrade layer hands it a
//! ready-to-use `Transport`, which is a boxed sink/stream pair of text
//! frames. Production connections wrap an axum WebSocket; tests use an
//! in-memory pair.

use std::pin::Pin;

use axum::extract::ws::{Message, WebSocket};
use futures_channel::mpsc;
use futures_util::{Sink, SinkExt, Stream, StreamExt};

/// Error surfaced by a transport half. The core treats any transport
/// error uniformly as a disconnect; the variant exists for logging.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("socket error: {0}")]
    Socket(String),
    #[error("peer closed the connection")]
    Closed,
}

impl From<axum::Error> for TransportError {
    fn from(err: axum::Error) -> Self {
        TransportError::Socket(err.to_string())
    }
}

/// One message frame. Signaling and chat payloads are JSON text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close,
}

/// Writer half of a transport.
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;

/// Reader half of a transport.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// A full-duplex, message-framed connection.
pub struct Transport {
    tx: FrameSink,
    rx: FrameStream,
}

impl Transport {
    pub fn new(tx: FrameSink, rx: FrameStream) -> Self {
        Self { tx, rx }
    }

    /// Hand the two halves to their pumps.
    pub fn split(self) -> (FrameSink, FrameStream) {
        (self.tx, self.rx)
    }

    /// Wrap an upgraded axum WebSocket.
    ///
    /// Ping/Pong and binary frames are skipped (the protocol stack
    /// answers pings below this layer); a Close frame ends the stream
    /// on the next poll.
    pub fn from_websocket(socket: WebSocket) -> Self {
        let (sink, stream) = socket.split();

        let tx: FrameSink = Box::pin(sink.with(|frame: Frame| async move {
            Ok::<Message, TransportError>(match frame {
                Frame::Text(text) => Message::Text(text.into()),
                Frame::Close => Message::Close(None),
            })
        }));

        let rx: FrameStream = Box::pin(stream.filter_map(|item| async move {
            match item {
                Ok(Message::Text(text)) => Some(Ok(Frame::Text(text.to_string()))),
                Ok(Message::Close(_)) => Some(Ok(Frame::Close)),
                Ok(_) => None,
                Err(err) => Some(Err(TransportError::from(err))),
            }
        }));

        Self { tx, rx }
    }

    /// In-memory duplex pair. Each side reads what the other writes.
    /// Dropping one side's transport ends the peer's stream.
    pub fn channel_pair(capacity: usize) -> (Transport, Transport) {
        let (left_tx, right_rx) = mpsc::channel::<Frame>(capacity);
        let (right_tx, left_rx) = mpsc::channel::<Frame>(capacity);

        let side = |tx: mpsc::Sender<Frame>, rx: mpsc::Receiver<Frame>| {
            let tx: FrameSink = Box::pin(tx.sink_map_err(|_| TransportError::Closed));
            let rx: FrameStream = Box::pin(rx.map(Ok));
            Transport::new(tx, rx)
        };

        (side(left_tx, left_rx), side(right_tx, right_rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_pair_is_full_duplex() {
        let (a, b) = Transport::channel_pair(8);
        let (mut a_tx, mut a_rx) = a.split();
        let (mut b_tx, mut b_rx) = b.split();

        a_tx.send(Frame::Text("ping".into())).await.unwrap();
        b_tx.send(Frame::Text("pong".into())).await.unwrap();

        assert_eq!(b_rx.next().await.unwrap().unwrap(), Frame::Text("ping".into()));
        assert_eq!(a_rx.next().await.unwrap().unwrap(), Frame::Text("pong".into()));
    }

    #[tokio::test]
    async fn dropping_one_side_ends_the_peer_stream() {
        let (a, b) = Transport::channel_pair(8);
        drop(a);
        let (_b_tx, mut b_rx) = b.split();
        assert!(b_rx.next().await.is_none());
    }
}
