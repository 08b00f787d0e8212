use std::time::Duration;

use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio_util::codec::Decoder;

use fl_participant::worker::codec::{WorkerCodec, MAX_LINE_BYTES};
use fl_participant::worker::stub::apply_line;
use fl_participant::worker::{DataRegistry, EventLoop, RegisteredObject, WorkerDirectory, WorkerStub};
use fl_participant::AppError;

fn object(id: &str, tags: &[&str]) -> RegisteredObject {
    RegisteredObject {
        id: id.to_owned(),
        tags: tags.iter().map(|t| (*t).to_owned()).collect(),
        shape: vec![4, 1],
    }
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[test]
fn codec_splits_lines() {
    let mut codec = WorkerCodec::new();
    let mut buf = BytesMut::from("{\"a\":1}\n{\"b\":2}\npartial");

    assert_eq!(codec.decode(&mut buf).expect("decode"), Some("{\"a\":1}".to_owned()));
    assert_eq!(codec.decode(&mut buf).expect("decode"), Some("{\"b\":2}".to_owned()));
    assert_eq!(codec.decode(&mut buf).expect("decode"), None);
    assert_eq!(codec.decode_eof(&mut buf).expect("eof"), Some("partial".to_owned()));
}

#[test]
fn codec_rejects_oversized_lines() {
    let mut codec = WorkerCodec::new();
    let mut buf = BytesMut::from(vec![b'x'; MAX_LINE_BYTES + 1].as_slice());
    assert!(matches!(codec.decode(&mut buf), Err(AppError::Worker(_))));
}

#[test]
fn registry_search_matches_tag_supersets() {
    let registry = DataRegistry::default();
    registry.insert(object("y-train", &["#y", "#train"]));
    registry.insert(object("x-train", &["#x", "#train"]));
    registry.insert(object("y-eval", &["#y", "#evaluate"]));

    let found: Vec<String> = registry.search(&["#y"]).into_iter().map(|o| o.id).collect();
    assert_eq!(found, vec!["y-eval".to_owned(), "y-train".to_owned()]);

    let found = registry.search(&["#y", "#train"]);
    assert_eq!(found, vec![object("y-train", &["#y", "#train"])]);

    assert_eq!(registry.search(&[]).len(), 3);
    assert!(registry.remove("x-train").is_some());
    assert_eq!(registry.len(), 2);
}

#[test]
fn apply_line_tracks_registrations_and_removals() {
    let registry = DataRegistry::default();
    let registered = r##"{"method":"object/registered","params":{"id":"o1","tags":["#y"],"shape":[3]}}"##;
    assert!(apply_line("w", registered, &registry).expect("registered"));
    assert_eq!(registry.len(), 1);

    let removed = r#"{"method":"object/removed","params":{"id":"o1"}}"#;
    assert!(apply_line("w", removed, &registry).expect("removed"));
    assert!(!apply_line("w", removed, &registry).expect("second removal"));
    assert!(registry.is_empty());
}

#[test]
fn apply_line_skips_logs_and_unknown_methods() {
    let registry = DataRegistry::default();
    let log = r#"{"method":"log","params":{"message":"epoch 1"}}"#;
    assert!(!apply_line("w", log, &registry).expect("log"));
    assert!(!apply_line("w", r#"{"method":"metrics/push","params":{}}"#, &registry).expect("unknown"));
    assert!(!apply_line("w", "   ", &registry).expect("blank"));

    assert!(matches!(apply_line("w", "not json", &registry), Err(AppError::Worker(_))));
    assert!(matches!(
        apply_line("w", r#"{"method":"object/removed","params":{}}"#, &registry),
        Err(AppError::Worker(_))
    ));
}

#[tokio::test]
async fn event_loop_feeds_registry_until_stream_closes() {
    let (mut client, server) = tokio::io::duplex(4096);
    let registry = DataRegistry::default();
    let mut event_loop = EventLoop::spawn("node/p1".into(), server, registry.clone());

    client
        .write_all(b"not json\n{\"method\":\"object/registered\",\"params\":{\"id\":\"o1\",\"tags\":[\"#x\"]}}\n")
        .await
        .expect("write");
    wait_for(|| registry.len() == 1).await;
    assert!(event_loop.is_running());

    drop(client);
    wait_for(|| !event_loop.is_running()).await;
    event_loop.close(Duration::from_secs(1)).await.expect("close");
}

#[tokio::test]
async fn event_loop_stops_on_request_while_stream_is_open() {
    let (_client, server) = tokio::io::duplex(64);
    let mut event_loop = EventLoop::spawn("node/p1".into(), server, DataRegistry::default());
    assert!(event_loop.is_running());

    event_loop.stop();
    event_loop.close(Duration::from_secs(1)).await.expect("close");
    assert!(!event_loop.is_running());
}

#[tokio::test]
async fn close_without_stop_times_out() {
    let (_client, server) = tokio::io::duplex(64);
    let mut event_loop = EventLoop::spawn("node/p1".into(), server, DataRegistry::default());

    let err = event_loop
        .close(Duration::from_millis(50))
        .await
        .expect_err("loop still reading");
    assert!(matches!(err, AppError::ResourceTeardown(_)));
}

#[tokio::test]
async fn stub_registers_in_directory_and_detaches_once() {
    let (_client, server) = tokio::io::duplex(64);
    let directory = WorkerDirectory::default();
    let mut stub = WorkerStub::start("node/p1".into(), server, directory.clone());

    assert_eq!(stub.worker_id(), "node/p1");
    assert!(directory.contains("node/p1"));
    assert!(stub.event_loop().is_running());

    stub.detach().expect("detach");
    assert!(!directory.contains("node/p1"));
    assert!(matches!(stub.detach(), Err(AppError::NotFound(_))));

    stub.event_loop().stop();
    stub.event_loop_mut()
        .close(Duration::from_secs(1))
        .await
        .expect("close");
}
