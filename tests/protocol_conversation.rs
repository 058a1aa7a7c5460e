//! Conversations between the protocol and a scripted server.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::BytesMut;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing_subscriber::EnvFilter;

use bolt_protocol::bolt::channel::{spawn_writer, MemoryChannel};
use bolt_protocol::bolt::chunking::{Chunker, Dechunker};
use bolt_protocol::bolt::handshake::{self, ProtocolVersion};
use bolt_protocol::bolt::message::{tag, AuthToken};
use bolt_protocol::bolt::packstream::{CodecConfig, Packer, Structure, Unpacker, Value};
use bolt_protocol::bolt::protocol::{
    factory, AuthenticateOptions, BeginOptions, LoginObserver, ProtocolConfig, ProtocolState,
    ResultStreamObserver, RunOptions, StreamEvent, SummaryObserver,
};
use bolt_protocol::{BoltError, BoltProtocol};

// ============================================================================
// Helpers
// ============================================================================

type Log = Arc<Mutex<Vec<String>>>;

fn server_bytes(messages: &[(u8, Vec<Value>)]) -> Vec<u8> {
    let codec = CodecConfig::default();
    let mut chunker = Chunker::new();
    for (signature, fields) in messages {
        let mut buf = BytesMut::new();
        Packer::new(&mut buf, &codec)
            .pack_message(*signature, fields)
            .unwrap();
        chunker.write_message(&buf);
    }
    chunker.take().to_vec()
}

fn client_messages(bytes: &[u8]) -> Vec<Structure> {
    let codec = CodecConfig::default();
    Dechunker::new()
        .feed(bytes)
        .unwrap()
        .iter()
        .map(|m| Unpacker::new(m, &codec).unpack_message().unwrap())
        .collect()
}

fn success(entries: &[(&str, Value)]) -> (u8, Vec<Value>) {
    let map = entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect::<HashMap<_, _>>();
    (tag::SUCCESS, vec![Value::Map(map)])
}

fn record(values: Vec<Value>) -> (u8, Vec<Value>) {
    (tag::RECORD, vec![Value::List(values)])
}

fn summary_observer(log: &Log, name: &'static str) -> SummaryObserver {
    let done = log.clone();
    let failed = log.clone();
    SummaryObserver::new()
        .on_complete(move |_| done.lock().push(format!("{name}:ok")))
        .on_error(move |e| failed.lock().push(format!("{name}:err:{e}")))
}

fn connected(version: ProtocolVersion) -> (BoltProtocol<MemoryChannel>, MemoryChannel) {
    let channel = MemoryChannel::new();
    let mut protocol = factory::create(version, channel.clone(), ProtocolConfig::default()).unwrap();
    protocol
        .authenticate(
            AuthenticateOptions::new(AuthToken::basic("neo4j", "pw")),
            LoginObserver::new(),
        )
        .unwrap();
    let responses = if protocol.capabilities().logon {
        server_bytes(&[success(&[]), success(&[])])
    } else {
        server_bytes(&[success(&[])])
    };
    protocol.handle_bytes(&responses).unwrap();
    channel.take();
    (protocol, channel)
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn run_on_4_0_streams_records_and_summary_to_one_observer() {
    let (mut protocol, channel) = connected(ProtocolVersion::V4_0);
    let log: Log = Arc::default();
    let (keys, records, done) = (log.clone(), log.clone(), log.clone());
    let observer = ResultStreamObserver::new()
        .on_keys(move |k| keys.lock().push(format!("keys:{}", k.join(","))))
        .on_record(move |v| records.lock().push(format!("record:{}", v[0])))
        .on_complete(move |meta| {
            done.lock()
                .push(format!("complete:{}", meta.get("type").map(Value::to_string).unwrap_or_default()))
        });

    protocol
        .run("RETURN 1 AS x", HashMap::new(), RunOptions::new(), observer)
        .unwrap();

    let written = client_messages(&channel.take());
    let tags: Vec<u8> = written.iter().map(|m| m.tag).collect();
    assert_eq!(tags, vec![tag::RUN, tag::PULL]);
    let pull = written[1].fields[0].as_map().unwrap();
    assert_eq!(pull.get("n"), Some(&Value::Integer(-1)));

    protocol
        .handle_bytes(&server_bytes(&[
            success(&[("fields", Value::List(vec!["x".into()]))]),
            record(vec![Value::Integer(1)]),
            success(&[("type", "r".into())]),
        ]))
        .unwrap();

    assert_eq!(
        *log.lock(),
        vec!["keys:x", "record:1", "complete:\"r\""]
    );
    assert_eq!(protocol.state(), ProtocolState::Ready);
    assert_eq!(protocol.pending(), 0);
}

#[test]
fn impersonation_before_4_4_writes_nothing() {
    let (mut protocol, channel) = connected(ProtocolVersion::V4_3);
    let err = protocol
        .begin_transaction(
            BeginOptions::new().with_impersonated_user("bob"),
            SummaryObserver::new(),
        )
        .unwrap_err();

    assert!(matches!(err, BoltError::ContractViolation(_)));
    assert!(err.to_string().contains("Trying to impersonate bob."));
    assert!(channel.written().is_empty());
    assert_eq!(protocol.pending(), 0);
    assert_eq!(protocol.state(), ProtocolState::Ready);
}

#[test]
fn fatal_error_fails_pending_observers_in_order() {
    let (mut protocol, channel) = connected(ProtocolVersion::V5_0);
    let log: Log = Arc::default();

    protocol
        .begin_transaction(BeginOptions::new(), summary_observer(&log, "begin"))
        .unwrap();
    protocol.commit_transaction(summary_observer(&log, "commit")).unwrap();
    protocol.rollback_transaction(summary_observer(&log, "rollback")).unwrap();
    assert_eq!(protocol.pending(), 3);

    protocol.handle_transport_error(BoltError::Connection("reset by peer".to_string()));
    assert_eq!(
        *log.lock(),
        vec![
            "begin:err:Connection error: reset by peer",
            "commit:err:Connection error: reset by peer",
            "rollback:err:Connection error: reset by peer",
        ]
    );
    assert!(protocol.is_broken());
    channel.take();

    // Later requests are refused and their observer receives the same error.
    protocol.commit_transaction(summary_observer(&log, "late")).unwrap();
    assert_eq!(log.lock().len(), 4);
    assert_eq!(log.lock()[3], "late:err:Connection error: reset by peer");
    assert!(channel.written().is_empty());
}

#[test]
fn chunk_boundaries_delimit_messages() {
    let mut dechunker = Dechunker::new();
    let messages = dechunker
        .feed(&[0x00, 0x05, 0xB1, 0x70, 0xA0, 0x00, 0x00, 0x00, 0x00])
        .unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].len(), 5);

    // A message fed one byte at a time.
    let (mut protocol, _) = connected(ProtocolVersion::V4_4);
    let (observer, mut rx) = SummaryObserver::oneshot();
    protocol.commit_transaction(observer).unwrap();
    let bytes = server_bytes(&[success(&[("bookmark", "bm:1".into())])]);
    for byte in &bytes {
        protocol.handle_bytes(std::slice::from_ref(byte)).unwrap();
    }
    let metadata = rx.try_recv().unwrap().unwrap();
    assert_eq!(metadata.get("bookmark"), Some(&Value::from("bm:1")));
}

#[test]
fn reset_after_failure_is_idempotent() {
    let config = ProtocolConfig::builder().with_reset_on_failure(false).build();
    let channel = MemoryChannel::new();
    let mut protocol = factory::create(ProtocolVersion::V4_4, channel.clone(), config).unwrap();
    protocol
        .authenticate(AuthenticateOptions::default(), LoginObserver::new())
        .unwrap();
    protocol.handle_bytes(&server_bytes(&[success(&[])])).unwrap();

    let log: Log = Arc::default();
    protocol.commit_transaction(summary_observer(&log, "commit")).unwrap();
    protocol.rollback_transaction(summary_observer(&log, "rollback")).unwrap();
    let failure_meta = [
        ("code".to_string(), Value::from("Neo.ClientError.Statement.SyntaxError")),
        ("message".to_string(), Value::from("bad")),
    ]
    .into_iter()
    .collect::<HashMap<_, _>>();
    protocol
        .handle_bytes(&server_bytes(&[
            (tag::FAILURE, vec![Value::Map(failure_meta)]),
            (tag::IGNORED, vec![]),
        ]))
        .unwrap();
    assert_eq!(protocol.state(), ProtocolState::Failed);
    assert_eq!(log.lock().len(), 2);
    assert!(log.lock()[1].starts_with("rollback:err:"));

    for _ in 0..2 {
        protocol
            .reset(bolt_protocol::bolt::protocol::ResetObserver::new())
            .unwrap();
        protocol.handle_bytes(&server_bytes(&[success(&[])])).unwrap();
        assert_eq!(protocol.state(), ProtocolState::Ready);
    }
}

// ============================================================================
// Async transport
// ============================================================================

#[tokio::test]
async fn conversation_over_duplex_stream() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let (mut client, mut server) = tokio::io::duplex(4096);

    let responses = server_bytes(&[
        success(&[("server", "Neo4j/4.4.0".into())]),
        success(&[("fields", Value::List(vec!["n".into()]))]),
        record(vec![Value::Integer(1)]),
        record(vec![Value::Integer(2)]),
        success(&[("bookmark", "bm:2".into())]),
    ]);
    let server_task = tokio::spawn(async move {
        let mut handshake = [0u8; handshake::HANDSHAKE_SIZE];
        server.read_exact(&mut handshake).await.unwrap();
        assert_eq!(&handshake[..4], &handshake::BOLT_MAGIC);
        server.write_all(&[0x00, 0x00, 0x04, 0x04]).await.unwrap();
        server.write_all(&responses).await.unwrap();
        server.shutdown().await.unwrap();

        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        received
    });

    let version = handshake::perform(&mut client, &handshake::default_proposals())
        .await
        .unwrap();
    assert_eq!(version, ProtocolVersion::V4_4);

    let (mut reader, writer) = tokio::io::split(client);
    let (channel, writer_task) = spawn_writer(writer);
    let mut protocol = factory::create(version, channel, ProtocolConfig::default()).unwrap();

    protocol
        .authenticate(AuthenticateOptions::default(), LoginObserver::new())
        .unwrap();
    let (observer, events) = ResultStreamObserver::channel();
    protocol
        .run("UNWIND [1, 2] AS n RETURN n", HashMap::new(), RunOptions::new(), observer)
        .unwrap();

    let mut incoming = Vec::new();
    reader.read_to_end(&mut incoming).await.unwrap();
    protocol.handle_bytes(&incoming).unwrap();
    assert_eq!(protocol.server_agent(), Some("Neo4j/4.4.0"));

    let events: Vec<StreamEvent> = events.collect().await;
    assert_eq!(events.len(), 4);
    assert!(matches!(&events[0], StreamEvent::Keys(keys) if keys == &["n"]));
    assert!(matches!(&events[2], StreamEvent::Record(values) if values == &[Value::Integer(2)]));
    match &events[3] {
        StreamEvent::Summary(meta) => assert_eq!(meta.get("bookmark"), Some(&Value::from("bm:2"))),
        other => panic!("unexpected event {other:?}"),
    }

    protocol.close();
    writer_task.await.unwrap().unwrap();
    let received = client_messages(&server_task.await.unwrap());
    let tags: Vec<u8> = received.iter().map(|m| m.tag).collect();
    assert_eq!(tags, vec![tag::HELLO, tag::RUN, tag::PULL, tag::GOODBYE]);
}
