//! Host and renderer repos converging over in-memory channels.

use std::sync::Arc;

use automerge::ROOT;
use automerge::transaction::Transactable;
use futures_lite::future::block_on;
use serde_json::{Value, json};
use tempfile::TempDir;

use verso_core::ChangeOrigin;
use verso_core::repo::{ArtifactStorage, FileStorage, MemoryStorage, Repo, RepoConfig};
use verso_core::transport::{
    HostAdapter, IpcChannel, MemoryChannel, NetworkAdapter, PeerId, PeerMetadata,
    RendererAdapter, TransportError, WireMessage,
};

/// One host process and its renderer windows, wired over memory channels.
struct Desktop {
    host: Repo,
    host_adapter: Arc<HostAdapter>,
    windows: Vec<Repo>,
    channels: Vec<Arc<MemoryChannel>>,
}

impl Desktop {
    fn new(window_count: usize) -> Self {
        Self::with_host_storage(window_count, Arc::new(MemoryStorage::new()))
    }

    fn with_host_storage(window_count: usize, storage: Arc<dyn ArtifactStorage>) -> Self {
        let mut host_ends: Vec<Arc<dyn IpcChannel>> = Vec::new();
        let mut window_ends = Vec::new();
        let mut channels = Vec::new();
        for _ in 0..window_count {
            let (host_end, window_end) = MemoryChannel::pair();
            let host_end = Arc::new(host_end);
            let window_end = Arc::new(window_end);
            channels.push(Arc::clone(&host_end));
            channels.push(Arc::clone(&window_end));
            host_ends.push(host_end);
            window_ends.push(window_end);
        }

        let host_adapter = HostAdapter::new(host_ends);
        let host = Repo::new(storage, RepoConfig::new("host"))
            .with_network(host_adapter.clone())
            .unwrap();

        let windows = window_ends
            .into_iter()
            .enumerate()
            .map(|(i, end)| {
                Repo::new(
                    Arc::new(MemoryStorage::new()),
                    RepoConfig::new(format!("window-{}", i)),
                )
                .with_network(RendererAdapter::new(end))
                .unwrap()
            })
            .collect();

        let desktop = Self {
            host,
            host_adapter,
            windows,
            channels,
        };
        desktop.settle();
        desktop
    }

    fn settle(&self) -> usize {
        let channels: Vec<&MemoryChannel> = self.channels.iter().map(|c| c.as_ref()).collect();
        MemoryChannel::run_until_idle(&channels)
    }
}

#[test]
fn handshake_makes_host_and_windows_peers() {
    let desktop = Desktop::new(2);

    assert_eq!(
        desktop.host.peers(),
        vec![PeerId::from("window-0"), PeerId::from("window-1")]
    );
    assert_eq!(desktop.host_adapter.peers(), desktop.host.peers());
    for window in &desktop.windows {
        assert_eq!(window.peers(), vec![PeerId::from("host")]);
    }
}

#[test]
fn window_finds_document_created_on_host() {
    let desktop = Desktop::new(1);
    let window = &desktop.windows[0];

    let original = desktop
        .host
        .create(&json!({"title": "Draft", "tags": ["a", "b"]}))
        .unwrap();
    let mirror = window.find::<Value>(&original.address()).unwrap();
    desktop.settle();

    assert!(mirror.is_ready());
    block_on(mirror.when_ready());
    assert_eq!(
        mirror.doc().unwrap().value().unwrap(),
        json!({"title": "Draft", "tags": ["a", "b"]})
    );
    assert_eq!(mirror.heads(), original.heads());
    assert_eq!(mirror.change_id(), original.change_id());
}

#[test]
fn window_finds_empty_document_created_on_host() {
    let desktop = Desktop::new(1);
    let window = &desktop.windows[0];

    let original = desktop.host.create(&json!({})).unwrap();
    let mirror = window.find::<Value>(&original.address()).unwrap();
    desktop.settle();

    assert!(mirror.is_ready());
    assert!(!mirror.is_unavailable());
    assert_eq!(mirror.heads(), original.heads());
    assert_eq!(mirror.doc().unwrap().schema_version(), 1);
}

#[test]
fn non_object_payload_is_not_created_or_synced() {
    let desktop = Desktop::new(1);
    let posted_before: usize = desktop.channels.iter().map(|c| c.posted_count()).sum();

    assert!(matches!(
        desktop.host.create(&vec![1, 2, 3]),
        Err(verso_core::VersoError::InvalidPayload(_))
    ));
    desktop.settle();

    let posted_after: usize = desktop.channels.iter().map(|c| c.posted_count()).sum();
    assert_eq!(posted_before, posted_after);
    assert!(desktop.host.handles().is_empty());
}

#[test]
fn find_before_handshake_is_answered_once_host_is_known() {
    let (host_end, window_end) = MemoryChannel::pair();
    let host_end = Arc::new(host_end);
    let window_end = Arc::new(window_end);

    let host = Repo::new(Arc::new(MemoryStorage::new()), RepoConfig::new("host"))
        .with_network(HostAdapter::new(vec![host_end.clone() as Arc<dyn IpcChannel>]))
        .unwrap();
    let original = host.create(&json!({"n": 1})).unwrap();

    let window = Repo::new(Arc::new(MemoryStorage::new()), RepoConfig::new("w"))
        .with_network(RendererAdapter::new(window_end.clone()))
        .unwrap();
    let mirror = window.find::<Value>(&original.address()).unwrap();
    assert!(!mirror.is_ready());

    MemoryChannel::run_until_idle(&[host_end.as_ref(), window_end.as_ref()]);
    assert!(mirror.is_ready());
    assert_eq!(mirror.doc().unwrap().value().unwrap()["n"], 1);
}

#[test]
fn edits_flow_both_ways() {
    let desktop = Desktop::new(1);
    let window = &desktop.windows[0];

    let on_host = desktop.host.create(&json!({"count": 0})).unwrap();
    let on_window = window.find::<Value>(&on_host.address()).unwrap();
    desktop.settle();

    on_window.change(|tx| tx.put(ROOT, "count", 1_i64)).unwrap();
    desktop.settle();
    assert_eq!(on_host.doc().unwrap().value().unwrap()["count"], 1);

    on_host.change(|tx| tx.put(ROOT, "title", "Hi")).unwrap();
    desktop.settle();
    assert_eq!(
        on_window.doc().unwrap().value().unwrap(),
        json!({"count": 1, "title": "Hi"})
    );
    assert_eq!(on_window.heads(), on_host.heads());
}

#[test]
fn concurrent_edits_converge() {
    let desktop = Desktop::new(1);
    let window = &desktop.windows[0];

    let on_host = desktop.host.create(&json!({"seed": true})).unwrap();
    let on_window = window.find::<Value>(&on_host.address()).unwrap();
    desktop.settle();

    on_host.change(|tx| tx.put(ROOT, "left", "host")).unwrap();
    on_window.change(|tx| tx.put(ROOT, "right", "window")).unwrap();
    assert_ne!(on_host.heads(), on_window.heads());

    desktop.settle();

    let expected = json!({"seed": true, "left": "host", "right": "window"});
    assert_eq!(on_host.doc().unwrap().value().unwrap(), expected);
    assert_eq!(on_window.doc().unwrap().value().unwrap(), expected);

    let mut host_heads = on_host.heads();
    let mut window_heads = on_window.heads();
    host_heads.sort();
    window_heads.sort();
    assert_eq!(host_heads, window_heads);
    assert_eq!(host_heads.len(), 2);
}

#[test]
fn edits_reach_other_windows_through_host() {
    let desktop = Desktop::new(2);
    let (first, second) = (&desktop.windows[0], &desktop.windows[1]);

    let created = first.create(&json!({"body": "one"})).unwrap();
    desktop.settle();

    let relayed = second.find::<Value>(&created.address()).unwrap();
    desktop.settle();
    assert!(relayed.is_ready());
    assert_eq!(relayed.doc().unwrap().value().unwrap()["body"], "one");

    relayed.change(|tx| tx.put(ROOT, "body", "two")).unwrap();
    desktop.settle();
    assert_eq!(created.doc().unwrap().value().unwrap()["body"], "two");
}

#[test]
fn remote_changes_reach_subscribers_as_remote() {
    let desktop = Desktop::new(1);
    let window = &desktop.windows[0];

    let on_host = desktop.host.create(&json!({"n": 0})).unwrap();
    let on_window = window.find::<Value>(&on_host.address()).unwrap();
    desktop.settle();

    let mut host_events = on_host.subscribe();
    on_window.change(|tx| tx.put(ROOT, "n", 7_i64)).unwrap();
    desktop.settle();

    let event = host_events.try_recv().unwrap();
    assert_eq!(event.origin, ChangeOrigin::Remote);
    assert!(!event.patches.is_empty());
    assert_eq!(event.doc.value().unwrap()["n"], 7);
    assert!(host_events.try_recv().is_none());
}

#[test]
fn unknown_document_becomes_unavailable() {
    let desktop = Desktop::new(1);
    let window = &desktop.windows[0];

    let missing = window.find::<Value>("doc:neverexisted").unwrap();
    desktop.settle();

    assert!(!missing.is_ready());
    assert!(missing.is_unavailable());
    assert!(missing.doc().is_err());
}

#[test]
fn closed_window_is_dropped_from_peers() {
    let desktop = Desktop::new(2);
    desktop.host_adapter.renderer_gone(&PeerId::from("window-0"));

    assert_eq!(desktop.host.peers(), vec![PeerId::from("window-1")]);

    // Changes keep flowing to the remaining window.
    let created = desktop.host.create(&json!({"x": 1})).unwrap();
    let mirror = desktop.windows[1].find::<Value>(&created.address()).unwrap();
    desktop.settle();
    assert!(mirror.is_ready());
}

#[test]
fn host_drops_sends_to_unknown_renderer() {
    let desktop = Desktop::new(1);
    let posted_before: usize = desktop.channels.iter().map(|c| c.posted_count()).sum();

    desktop
        .host_adapter
        .send(WireMessage::Sync {
            sender_id: "host".into(),
            target_id: "nobody".into(),
            document_id: "doc:abc".parse().unwrap(),
            data: vec![1, 2, 3],
        })
        .unwrap();

    let posted_after: usize = desktop.channels.iter().map(|c| c.posted_count()).sum();
    assert_eq!(posted_before, posted_after);
}

#[test]
fn empty_payload_is_rejected_before_posting() {
    let (host_end, window_end) = MemoryChannel::pair();
    let window_end = Arc::new(window_end);
    let adapter = RendererAdapter::new(window_end.clone());
    adapter
        .connect("w".into(), PeerMetadata::default())
        .unwrap();
    let posted = window_end.posted_count();

    let result = adapter.send(WireMessage::Ephemeral {
        sender_id: "w".into(),
        target_id: "host".into(),
        document_id: "doc:abc".parse().unwrap(),
        data: vec![],
    });
    assert!(matches!(result, Err(TransportError::EmptyPayload)));
    assert_eq!(window_end.posted_count(), posted);
    assert_eq!(host_end.pending(), 1);
}

#[test]
fn ephemeral_data_is_relayed_to_listeners() {
    let desktop = Desktop::new(1);
    let window = &desktop.windows[0];
    let received = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    desktop
        .host
        .on_ephemeral(Arc::new(move |m| sink.lock().unwrap().push(m.clone())));

    let doc = window.create(&json!({})).unwrap();
    window
        .broadcast_ephemeral(doc.id(), b"cursor:4".to_vec())
        .unwrap();
    desktop.settle();

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].sender_id, PeerId::from("window-0"));
    assert_eq!(received[0].document_id, *doc.id());
    assert_eq!(received[0].data, b"cursor:4".to_vec());
}

#[test]
fn host_file_storage_survives_restart() {
    let temp = TempDir::new().unwrap();
    let address = {
        let storage = Arc::new(FileStorage::open(temp.path()).unwrap());
        let desktop = Desktop::with_host_storage(1, storage);
        let created = desktop.windows[0].create(&json!({"kept": true})).unwrap();
        desktop.settle();
        created.address()
    };

    let reopened = Repo::new(
        Arc::new(FileStorage::open(temp.path()).unwrap()),
        RepoConfig::new("host"),
    );
    let handle = reopened.find::<Value>(&address).unwrap();
    assert!(handle.is_ready());
    assert_eq!(handle.doc().unwrap().value().unwrap()["kept"], true);
}
