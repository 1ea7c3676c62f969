//! In-process channel transport: routing and liveness.

use std::time::Duration;

use fairq::engine::Inbound;
use fairq::model::{Outbound, Record, WorkerId};
use fairq::transport::{ChannelTransport, Transport};
use tokio::sync::mpsc;
use tokio::time::timeout;

const TIMEOUT: Duration = Duration::from_secs(1);

fn chunk(key: &str) -> Outbound {
    Outbound::Chunk {
        records: vec![Record::new([key])],
    }
}

#[tokio::test]
async fn send_reaches_the_connected_worker() {
    let transport = ChannelTransport::new();
    let (inbound, _inbound_rx) = mpsc::unbounded_channel();
    let id = WorkerId::new();
    let mut rx = transport.connect(id, inbound);

    transport.send(id, chunk("a"));

    assert!(transport.is_connected(id));
    assert_eq!(rx.recv().await, Some(chunk("a")));
}

#[tokio::test]
async fn disconnect_closes_the_worker_channel() {
    let transport = ChannelTransport::new();
    let (inbound, mut inbound_rx) = mpsc::unbounded_channel();
    let id = WorkerId::new();
    let mut rx = transport.connect(id, inbound);
    transport.send(id, chunk("a"));

    transport.disconnect(id);

    // Messages already queued are still delivered, then the channel ends.
    let first = timeout(TIMEOUT, rx.recv()).await.expect("channel stayed open");
    assert_eq!(first, Some(chunk("a")));
    let next = timeout(TIMEOUT, rx.recv()).await.expect("channel stayed open");
    assert_eq!(next, None);

    assert!(!transport.is_connected(id));
    // Disconnecting is not a liveness loss.
    assert!(inbound_rx.try_recv().is_err());

    // Later sends are dropped, not delivered anywhere.
    transport.send(id, chunk("b"));
    transport.disconnect(id);
}

#[tokio::test]
async fn dropping_the_receiver_reports_worker_lost() {
    let transport = ChannelTransport::new();
    let (inbound, mut inbound_rx) = mpsc::unbounded_channel();
    let id = WorkerId::new();
    let rx = transport.connect(id, inbound);

    drop(rx);

    let signal = timeout(TIMEOUT, inbound_rx.recv()).await.expect("no liveness signal");
    assert_eq!(signal, Some(Inbound::WorkerLost(id)));
    assert!(!transport.is_connected(id));
}

#[tokio::test]
async fn reconnecting_replaces_the_old_route() {
    let transport = ChannelTransport::new();
    let (inbound, _inbound_rx) = mpsc::unbounded_channel();
    let id = WorkerId::new();
    let mut old = transport.connect(id, inbound.clone());
    let mut new = transport.connect(id, inbound);

    transport.send(id, chunk("a"));

    let ended = timeout(TIMEOUT, old.recv()).await.expect("old channel stayed open");
    assert_eq!(ended, None);
    assert_eq!(new.recv().await, Some(chunk("a")));
}
