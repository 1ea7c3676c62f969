//! Control plane: end-to-end runs with in-process workers.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use fairq::coordinator::Coordinator;
use fairq::engine::{ControlConfig, ControlHandle, ControlPlane};
use fairq::error::Result;
use fairq::event::EventKind;
use fairq::membership::MemberState;
use fairq::model::{Outbound, Record, WorkerId};
use fairq::source::{RecordSource, VecSource};
use fairq::transport::ChannelTransport;
use tokio::sync::mpsc;

const TIMEOUT: Duration = Duration::from_secs(5);

fn batches(sizes: &[usize]) -> Vec<Vec<Record>> {
    let mut n = 0;
    sizes
        .iter()
        .map(|size| {
            (0..*size)
                .map(|_| {
                    n += 1;
                    Record::new([format!("r{n:03}")])
                })
                .collect()
        })
        .collect()
}

/// Processes every chunk it gets and reports completion.
async fn diligent_worker(
    id: WorkerId,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    handle: ControlHandle,
    seen: mpsc::UnboundedSender<String>,
) {
    while let Some(msg) = rx.recv().await {
        if let Outbound::Chunk { records } = msg {
            for record in &records {
                let _ = seen.send(record.key().to_string());
            }
            handle.chunk_completed(id, records.len());
        }
    }
}

/// Counts how often it is asked for a batch.
struct CountingSource {
    inner: VecSource,
    calls: Arc<AtomicUsize>,
}

impl RecordSource for CountingSource {
    async fn next_batch(&mut self) -> Result<Vec<Record>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.next_batch().await
    }
}

#[tokio::test]
async fn every_record_is_processed_exactly_once() {
    let transport = ChannelTransport::new();
    let control = ControlPlane::new(
        Coordinator::new(transport.clone(), 2),
        ControlConfig {
            exit_when_drained: true,
        },
    );
    let handle = control.handle();

    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    for _ in 0..3 {
        let id = WorkerId::new();
        let rx = transport.connect(id, handle.inbound());
        tokio::spawn(diligent_worker(id, rx, handle.clone(), seen_tx.clone()));
        handle.worker_joined(id);
    }
    drop(seen_tx);

    let source = VecSource::new(batches(&[7, 4, 12]));
    let coordinator = tokio::time::timeout(TIMEOUT, control.run(source))
        .await
        .expect("control plane did not drain")
        .unwrap();

    assert!(coordinator.is_drained());
    assert_eq!(coordinator.members().live_count(), 3);

    let mut seen = Vec::new();
    while let Ok(key) = seen_rx.try_recv() {
        seen.push(key);
    }
    seen.sort();
    let expected: Vec<String> = (1..=23).map(|n| format!("r{n:03}")).collect();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn late_worker_picks_up_buffered_records() {
    let transport = ChannelTransport::new();
    let control = ControlPlane::new(
        Coordinator::new(transport.clone(), 5),
        ControlConfig {
            exit_when_drained: true,
        },
    );
    let handle = control.handle();
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

    let joiner = {
        let handle = handle.clone();
        let transport = transport.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let id = WorkerId::new();
            let rx = transport.connect(id, handle.inbound());
            tokio::spawn(diligent_worker(id, rx, handle.clone(), seen_tx));
            handle.worker_joined(id);
        })
    };

    let source = VecSource::new(batches(&[3, 3]));
    let coordinator = tokio::time::timeout(TIMEOUT, control.run(source))
        .await
        .expect("control plane did not drain")
        .unwrap();
    joiner.await.unwrap();

    assert!(coordinator.buffer().is_empty());
    let buffered = coordinator
        .events_since(0)
        .iter()
        .filter(|e| matches!(e.kind, EventKind::RecordsBuffered { .. }))
        .count();
    assert_eq!(buffered, 2);

    let mut seen = 0;
    while seen_rx.try_recv().is_ok() {
        seen += 1;
    }
    assert_eq!(seen, 6);
}

#[tokio::test]
async fn shutdown_without_workers_keeps_records_buffered() {
    let control = ControlPlane::new(
        Coordinator::new(ChannelTransport::new(), 5),
        ControlConfig::default(),
    );
    let handle = control.handle();
    let run = tokio::spawn(control.run(VecSource::new(batches(&[2, 3]))));

    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.shutdown();

    let coordinator = tokio::time::timeout(TIMEOUT, run)
        .await
        .expect("control plane ignored shutdown")
        .unwrap()
        .unwrap();

    assert!(coordinator.input_exhausted());
    assert_eq!(coordinator.buffer().len(), 5);
    assert!(!coordinator.is_drained());
}

#[tokio::test]
async fn source_is_not_read_past_end_of_input() {
    let calls = Arc::new(AtomicUsize::new(0));
    let source = CountingSource {
        inner: VecSource::new(batches(&[1, 1, 1])),
        calls: Arc::clone(&calls),
    };
    let control = ControlPlane::new(
        Coordinator::new(ChannelTransport::new(), 5),
        ControlConfig::default(),
    );
    let handle = control.handle();
    let run = tokio::spawn(control.run(source));

    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.shutdown();
    tokio::time::timeout(TIMEOUT, run)
        .await
        .expect("control plane ignored shutdown")
        .unwrap()
        .unwrap();

    // Three batches plus the one empty read that ended the input.
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn dropped_worker_is_detected_and_pruned() {
    let transport = ChannelTransport::new();
    let control = ControlPlane::new(
        Coordinator::new(transport.clone(), 5),
        ControlConfig {
            exit_when_drained: true,
        },
    );
    let handle = control.handle();

    // Takes one chunk, then goes away without reporting completion.
    let id = WorkerId::new();
    let mut rx = transport.connect(id, handle.inbound());
    tokio::spawn(async move {
        let _ = rx.recv().await;
    });
    handle.worker_joined(id);

    let source = VecSource::new(batches(&[3]));
    let coordinator = tokio::time::timeout(TIMEOUT, control.run(source))
        .await
        .expect("worker loss was never observed")
        .unwrap();

    assert_eq!(coordinator.members().state(id), MemberState::Terminated);
    assert!(!coordinator.registry().contains(id));
    assert!(!transport.is_connected(id));
    let lost = coordinator.events_since(0).iter().any(|e| {
        e.kind
            == EventKind::WorkerLost {
                worker: id,
                abandoned: 3,
                requeued: 0,
            }
    });
    assert!(lost);
}

#[tokio::test]
async fn reported_loss_closes_the_worker_channel() {
    let transport = ChannelTransport::new();
    let control = ControlPlane::new(
        Coordinator::new(transport.clone(), 5),
        ControlConfig::default(),
    );
    let handle = control.handle();

    let id = WorkerId::new();
    let mut rx = transport.connect(id, handle.inbound());
    handle.worker_joined(id);
    handle.worker_lost(id);
    let run = tokio::spawn(control.run(VecSource::new(Vec::<Vec<Record>>::new())));

    let ended = tokio::time::timeout(TIMEOUT, rx.recv())
        .await
        .expect("worker channel stayed open after loss");
    assert_eq!(ended, None);

    handle.shutdown();
    let coordinator = tokio::time::timeout(TIMEOUT, run)
        .await
        .expect("control plane ignored shutdown")
        .unwrap()
        .unwrap();
    assert_eq!(coordinator.members().state(id), MemberState::Terminated);
    assert!(!transport.is_connected(id));
}
