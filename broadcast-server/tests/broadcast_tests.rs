//! End-to-end tests against real loopback sockets.

use std::net::SocketAddr;
use std::time::Duration;

use broadcast_server::{
    BroadcastError, BroadcastServer, SessionEvent, SessionId, SessionSet, Target,
    OUTBOUND_QUEUE_LENGTH,
};
use gauge_protocol::{Message, VariableKey};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(2);

struct Harness {
    addr: SocketAddr,
    sessions: SessionSet,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    shutdown: CancellationToken,
}

impl Harness {
    async fn start() -> Self {
        Self::with_queue_length(OUTBOUND_QUEUE_LENGTH).await
    }

    async fn with_queue_length(length: usize) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        let server = BroadcastServer::bind("127.0.0.1:0".parse().unwrap(), events_tx)
            .await
            .unwrap()
            .with_queue_length(length);
        let addr = server.local_addr();
        let sessions = server.sessions();
        let shutdown = CancellationToken::new();
        tokio::spawn(server.run(shutdown.clone()));

        Self {
            addr,
            sessions,
            events,
            shutdown,
        }
    }

    async fn next_event(&mut self) -> SessionEvent {
        timeout(WAIT, self.events.recv())
            .await
            .expect("timed out waiting for a session event")
            .expect("event channel closed")
    }

    /// Connect a client and wait until the server has registered it
    async fn connect(&mut self) -> (SessionId, Client) {
        let stream = TcpStream::connect(self.addr).await.unwrap();
        match self.next_event().await {
            SessionEvent::Connected { id, .. } => (id, Client::new(stream)),
            other => panic!("Expected Connected, got {other:?}"),
        }
    }
}

struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    fn new(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    async fn send_raw(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
    }

    async fn recv(&mut self) -> Message {
        let mut line = String::new();
        timeout(WAIT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a line")
            .unwrap();
        gauge_protocol::decode_line(&line).unwrap()
    }
}

#[tokio::test]
async fn test_bind_conflict_is_reported() {
    let harness = Harness::start().await;
    let (tx, _rx) = mpsc::unbounded_channel();

    match BroadcastServer::bind(harness.addr, tx).await {
        Err(BroadcastError::Bind { addr, .. }) => assert_eq!(addr, harness.addr),
        Err(other) => panic!("Expected Bind error, got {other:?}"),
        Ok(_) => panic!("Expected Bind error, got a server"),
    }
}

#[tokio::test]
async fn test_inbound_messages_are_decoded() {
    let mut harness = Harness::start().await;
    let (id, mut client) = harness.connect().await;

    client
        .send_raw(
            r#"{"type":"Init","payload":{"vehicleName":"Cessna Skyhawk","vars":[{"name":"ALT","unit":"feet"}],"events":[]}}"#,
        )
        .await;
    client.send_raw("\n").await;

    match harness.next_event().await {
        SessionEvent::Message {
            id: from,
            message: Message::Init(payload),
        } => {
            assert_eq!(from, id);
            assert_eq!(payload.vehicle_name.as_deref(), Some("Cessna Skyhawk"));
            assert_eq!(payload.keys(), vec![VariableKey::new("alt", Some("FEET"))]);
        }
        other => panic!("Expected Init message, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_line_keeps_connection() {
    let mut harness = Harness::start().await;
    let (id, mut client) = harness.connect().await;

    client.send_raw("this is not json\n").await;
    client
        .send_raw("{\"type\":\"Init\",\"payload\":{\"vehicleName\":null}}\n")
        .await;

    match harness.next_event().await {
        SessionEvent::Message { id: from, message } => {
            assert_eq!(from, id);
            assert_eq!(message, Message::Init(Default::default()));
        }
        other => panic!("Expected the second line to arrive, got {other:?}"),
    }
    assert!(harness.sessions.contains(id));
}

#[tokio::test]
async fn test_send_reaches_target() {
    let mut harness = Harness::start().await;
    let (first, mut first_client) = harness.connect().await;
    let (_, mut second_client) = harness.connect().await;

    let key = VariableKey::new("INDICATED ALTITUDE", Some("feet"));
    let queued = harness
        .sessions
        .send(Target::All, &Message::var(&key, json!(1500)))
        .unwrap();
    assert_eq!(queued, 2);

    for client in [&mut first_client, &mut second_client] {
        match client.recv().await {
            Message::Var(payload) => {
                assert_eq!(payload.key(), key);
                assert_eq!(payload.value, json!(1500));
            }
            other => panic!("Expected Var, got {other:?}"),
        }
    }

    let ack = Message::init_ack(Some("Piper PA44".to_string()));
    harness.sessions.send(Target::One(first), &ack).unwrap();
    assert_eq!(first_client.recv().await, ack);
}

#[tokio::test]
async fn test_disconnect_is_reported_once() {
    let mut harness = Harness::start().await;
    let (id, client) = harness.connect().await;
    drop(client);

    assert_eq!(
        harness.next_event().await,
        SessionEvent::Disconnected { id }
    );
    assert!(!harness.sessions.contains(id));

    // Nothing further for that session
    assert!(timeout(Duration::from_millis(200), harness.events.recv())
        .await
        .is_err());
}

#[tokio::test]
async fn test_dead_client_does_not_block_others() {
    let mut harness = Harness::start().await;
    let (_, dead) = harness.connect().await;
    let (_, mut alive) = harness.connect().await;

    drop(dead);
    assert!(matches!(
        harness.next_event().await,
        SessionEvent::Disconnected { .. }
    ));

    let key = VariableKey::new("PLANE BANK DEGREES", Some("degrees"));
    for value in 0..50 {
        harness
            .sessions
            .send(Target::All, &Message::var(&key, json!(value)))
            .unwrap();
    }

    for value in 0..50 {
        match alive.recv().await {
            Message::Var(payload) => assert_eq!(payload.value, json!(value)),
            other => panic!("Expected Var, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_shutdown_closes_sessions() {
    let mut harness = Harness::start().await;
    let (id, mut client) = harness.connect().await;

    harness.shutdown.cancel();
    assert_eq!(
        harness.next_event().await,
        SessionEvent::Disconnected { id }
    );

    let mut line = String::new();
    let read = timeout(WAIT, client.reader.read_line(&mut line))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(read, 0);
}

#[tokio::test]
async fn test_client_that_stops_reading_is_disconnected() {
    let mut harness = Harness::with_queue_length(4).await;
    let (stalled, _never_read) = harness.connect().await;

    // Large lines fill the socket buffers quickly, then the queue
    let key = VariableKey::unitless("ATC MESSAGE");
    let bulky = Message::var(&key, json!("x".repeat(64 * 1024)));
    let mut sent = 0;
    while harness.sessions.contains(stalled) {
        assert!(sent < 10_000, "stalled session was never disconnected");
        harness.sessions.send(Target::All, &bulky).unwrap();
        sent += 1;
        tokio::task::yield_now().await;
    }

    assert_eq!(
        harness.next_event().await,
        SessionEvent::Disconnected { id: stalled }
    );

    let (_, mut fresh) = harness.connect().await;
    let ping = Message::var(&key, json!("hello"));
    assert_eq!(harness.sessions.send(Target::All, &ping).unwrap(), 1);
    assert_eq!(fresh.recv().await, ping);
}
