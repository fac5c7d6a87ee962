//! Generic per-client pub/sub delivery hub.
//!
//! The registry maps a client id to its live session and enables
//! best-effort `send`/`send_many` to online clients. Delivery is
//! at-most-once: an offline recipient or a full mailbox drops the
//! message silently. Each registered session runs one read pump (for
//! liveness detection only) and one write pump (mailbox -> transport).

pub mod message;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::transport::{Frame, FrameSink, FrameStream, Transport};

/// Outbound mailbox depth per session. The mailbox is a small jitter
/// buffer between producers and socket I/O, not a durable queue.
pub const MAILBOX_CAPACITY: usize = 64;

/// One connected client: identity plus its exclusively-owned transport.
pub struct Session {
    client_id: String,
    transport: Transport,
}

impl Session {
    pub fn new(client_id: impl Into<String>, transport: Transport) -> Self {
        Self {
            client_id: client_id.into(),
            transport,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

/// Live registry entry. The generation tag lets `unregister` remove the
/// entry only if it still belongs to the session that is going away;
/// an overwritten (orphaned) session fails its pumps without touching
/// its successor's entry.
struct SessionEntry<M> {
    outbound: mpsc::Sender<M>,
    generation: u64,
}

/// Process-wide client registry, generic over the message type it
/// delivers. Messages are serialized to JSON text frames on the write
/// pump.
pub struct Hub<M> {
    clients: DashMap<String, SessionEntry<M>>,
    generations: AtomicU64,
}

impl<M> Default for Hub<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Hub<M> {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
            generations: AtomicU64::new(0),
        }
    }

    pub fn is_connected(&self, client_id: &str) -> bool {
        self.clients.contains_key(client_id)
    }
}

impl<M> Hub<M>
where
    M: Serialize + Send + 'static,
{
    /// Insert the session into the registry (overwriting any prior
    /// entry for the same client id) and start its read/write pumps.
    pub fn register(self: &Arc<Self>, session: Session) {
        let Session {
            client_id,
            transport,
        } = session;

        let (outbound, mailbox) = mpsc::channel::<M>(MAILBOX_CAPACITY);
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);

        // A second registration under the same id overwrites the entry.
        // Dropping the old entry closes the old mailbox, so the orphaned
        // session's write pump exits and its transport closes on its own.
        self.clients.insert(
            client_id.clone(),
            SessionEntry {
                outbound,
                generation,
            },
        );

        tracing::debug!(client_id = %client_id, generation, "session registered");

        let (sink, stream) = transport.split();

        let hub = Arc::clone(self);
        let writer_id = client_id.clone();
        tokio::spawn(async move {
            hub.write_pump(writer_id, generation, sink, mailbox).await;
        });

        let hub = Arc::clone(self);
        tokio::spawn(async move {
            hub.read_pump(client_id, generation, stream).await;
        });
    }

    /// Remove the registry entry if it still belongs to the given
    /// session generation. Idempotent: stale or repeated calls no-op.
    /// Removing the entry closes the mailbox, which in turn makes the
    /// write pump exit and close the transport.
    pub fn unregister(&self, client_id: &str, generation: u64) {
        let removed = self
            .clients
            .remove_if(client_id, |_, entry| entry.generation == generation);
        if removed.is_some() {
            tracing::debug!(client_id = %client_id, generation, "session unregistered");
        }
    }

    /// Best-effort delivery to one client. Offline id or full mailbox:
    /// the message is dropped, never queued or retried.
    pub fn send(&self, client_id: &str, msg: M) {
        let Some(entry) = self.clients.get(client_id) else {
            return;
        };
        match entry.outbound.try_send(msg) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(client_id = %client_id, "mailbox full, message dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // Raced an unregister; the entry is on its way out.
                tracing::debug!(client_id = %client_id, "session closing, message dropped");
            }
        }
    }

    async fn write_pump(
        self: Arc<Self>,
        client_id: String,
        generation: u64,
        mut sink: FrameSink,
        mut mailbox: mpsc::Receiver<M>,
    ) {
        while let Some(msg) = mailbox.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(err) => {
                    tracing::warn!(
                        client_id = %client_id,
                        error = %err,
                        "outbound message failed to serialize"
                    );
                    continue;
                }
            };
            if sink.send(Frame::Text(text)).await.is_err() {
                // Write error: the connection is broken.
                self.unregister(&client_id, generation);
                return;
            }
        }
        // Mailbox closed by unregister: clean exit, close the transport.
        let _ = sink.send(Frame::Close).await;
    }

    /// Frames are not interpreted here; the read side exists to detect
    /// liveness. Any read error or close triggers unregister.
    async fn read_pump(
        self: Arc<Self>,
        client_id: String,
        generation: u64,
        mut stream: FrameStream,
    ) {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Frame::Text(_)) => continue,
                Ok(Frame::Close) | Err(_) => break,
            }
        }
        self.unregister(&client_id, generation);
    }
}

impl<M> Hub<M>
where
    M: Serialize + Clone + Send + 'static,
{
    /// Apply `send` independently per recipient; a drop for one never
    /// affects delivery to the others.
    pub fn send_many<I, S>(&self, client_ids: I, msg: M)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for id in client_ids {
            self.send(id.as_ref(), msg.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::message::ChatMessage;
    use super::*;
    use crate::transport::Transport;
    use serde_json::json;
    use std::time::Duration;

    async fn next_text(rx: &mut FrameStream) -> Option<String> {
        match tokio::time::timeout(Duration::from_secs(1), rx.next()).await {
            Ok(Some(Ok(Frame::Text(text)))) => Some(text),
            _ => None,
        }
    }

    #[tokio::test]
    async fn send_to_offline_client_is_a_noop() {
        let hub: Arc<Hub<ChatMessage>> = Arc::new(Hub::new());
        hub.send("nobody", ChatMessage::direct(json!({"body": "hi"})));
        assert!(!hub.is_connected("nobody"));
    }

    #[tokio::test]
    async fn registered_client_receives_sent_messages() {
        let hub: Arc<Hub<ChatMessage>> = Arc::new(Hub::new());
        let (server_side, client_side) = Transport::channel_pair(8);
        hub.register(Session::new("alice", server_side));

        hub.send("alice", ChatMessage::direct(json!({"body": "hello"})));

        let (_tx, mut rx) = client_side.split();
        let text = next_text(&mut rx).await.expect("expected a frame");
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "direct_message");
        assert_eq!(value["payload"]["body"], "hello");
    }

    #[tokio::test]
    async fn send_many_delivers_independently() {
        let hub: Arc<Hub<ChatMessage>> = Arc::new(Hub::new());
        let (a_server, a_client) = Transport::channel_pair(8);
        hub.register(Session::new("alice", a_server));

        // bob is offline; delivery to alice must be unaffected
        hub.send_many(
            ["alice", "bob"],
            ChatMessage::team(json!({"teamId": "t1", "body": "standup"})),
        );

        let (_tx, mut rx) = a_client.split();
        let text = next_text(&mut rx).await.expect("expected a frame");
        assert!(text.contains("team_broadcast"));
    }

    #[tokio::test]
    async fn full_mailbox_drops_excess_without_blocking_the_sender() {
        let hub: Arc<Hub<ChatMessage>> = Arc::new(Hub::new());
        let (a_server, a_client) = Transport::channel_pair(1);
        let (b_server, b_client) = Transport::channel_pair(8);
        hub.register(Session::new("alice", a_server));
        hub.register(Session::new("bob", b_server));

        // alice never reads, so her write pump parks on the clogged
        // transport and the mailbox fills up.
        let sent = MAILBOX_CAPACITY + 16;
        for n in 0..sent {
            hub.send("alice", ChatMessage::direct(json!({ "n": n })));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Other clients are unaffected by alice's backlog.
        hub.send("bob", ChatMessage::direct(json!({"body": "through"})));
        let (_b_tx, mut b_rx) = b_client.split();
        let text = next_text(&mut b_rx).await.expect("expected a frame");
        assert!(text.contains("through"));

        // The accepted prefix survives in order; the overflow is gone.
        let (_a_tx, mut a_rx) = a_client.split();
        let first = next_text(&mut a_rx).await.expect("expected a frame");
        assert!(first.contains("\"n\":0"));
        let mut received = 1;
        while next_text(&mut a_rx).await.is_some() {
            received += 1;
        }
        assert!(received < sent, "overflow not dropped: {received} of {sent}");
        assert!(hub.is_connected("alice"));
    }

    #[tokio::test]
    async fn reregistration_overwrites_and_orphans_the_old_session() {
        let hub: Arc<Hub<ChatMessage>> = Arc::new(Hub::new());
        let (first_server, first_client) = Transport::channel_pair(8);
        let (second_server, second_client) = Transport::channel_pair(8);

        hub.register(Session::new("alice", first_server));
        hub.register(Session::new("alice", second_server));

        hub.send("alice", ChatMessage::direct(json!({"n": 2})));

        // Only the second session receives; the first's transport is
        // closed by its orphaned write pump.
        let (_tx2, mut rx2) = second_client.split();
        let text = next_text(&mut rx2).await.expect("expected a frame");
        assert!(text.contains("\"n\":2"));

        let (_tx1, mut rx1) = first_client.split();
        match tokio::time::timeout(Duration::from_secs(1), rx1.next()).await {
            Ok(Some(Ok(Frame::Close))) | Ok(None) => {}
            other => panic!("expected orphaned transport to close, got {other:?}"),
        }
        assert!(hub.is_connected("alice"));
    }

    #[tokio::test]
    async fn client_disconnect_unregisters_the_session() {
        let hub: Arc<Hub<ChatMessage>> = Arc::new(Hub::new());
        let (server_side, client_side) = Transport::channel_pair(8);
        hub.register(Session::new("alice", server_side));

        // Client goes away: read pump sees the stream end.
        drop(client_side);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!hub.is_connected("alice"));

        // A late send is a silent no-op.
        hub.send("alice", ChatMessage::direct(json!({"late": true})));
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let hub: Arc<Hub<ChatMessage>> = Arc::new(Hub::new());
        let (server_side, _client_side) = Transport::channel_pair(8);
        hub.register(Session::new("alice", server_side));

        hub.unregister("alice", 0);
        hub.unregister("alice", 0);
        assert!(!hub.is_connected("alice"));
    }
}
