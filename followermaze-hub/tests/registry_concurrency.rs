//! Kept as the only test in this binary so the process-wide
//! `connected_clients` gauge is not moved by anything else.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use followermaze_core::metrics::delivery::CONNECTED_CLIENTS;
use followermaze_core::{Message, SeqId, UserId};
use followermaze_hub::{ChannelSink, ClientRegistry, ClientSink, Dispatcher, FollowerGraph};

const WORKERS: u64 = 8;
const IDS_PER_WORKER: u64 = 64;
const ROUNDS: usize = 50;
const CONTESTED: UserId = UserId(1_000_000);

fn sink(id: UserId) -> Arc<dyn ClientSink> {
    // The receiver is dropped, so deliveries fail as Closed and are counted
    let (sink, _rx) = ChannelSink::new(id, 1);
    Arc::new(sink)
}

fn worker_ids(worker: u64) -> impl Iterator<Item = UserId> {
    (0..IDS_PER_WORKER).map(move |n| UserId(worker * 1_000 + n))
}

#[test]
fn test_concurrent_register_unregister_during_dispatch() {
    let before = CONNECTED_CLIENTS.get();
    let graph = FollowerGraph::new();
    let registry = ClientRegistry::new();
    let dispatcher = Dispatcher::new(graph.clone(), registry.clone());
    for worker in 0..WORKERS {
        graph.add_follower(UserId(worker * 1_000), UserId(worker * 1_000 + 1));
    }

    let done = Arc::new(AtomicBool::new(false));
    let barrier = Arc::new(Barrier::new(usize::try_from(WORKERS).unwrap()));

    let fan_out = {
        let dispatcher = dispatcher.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut seq = 1;
            while !done.load(Ordering::Acquire) {
                let to = UserId((seq % WORKERS) * 1_000 + 1);
                dispatcher.dispatch(&Message::Broadcast { seq: SeqId(seq) });
                dispatcher.dispatch(&Message::PrivateMessage { seq: SeqId(seq + 1), from: UserId(0), to });
                dispatcher.dispatch(&Message::StatusUpdate { seq: SeqId(seq + 2), from: UserId(0) });
                for sink in dispatcher.registry().sinks() {
                    assert!(sink.id() == CONTESTED || sink.id().0 % 1_000 < IDS_PER_WORKER);
                }
                seq += 3;
            }
        })
    };

    let workers: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let registry = registry.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    for id in worker_ids(worker) {
                        assert!(registry.register(id, sink(id)));
                        assert!(!registry.register(id, sink(id)));
                    }
                    if registry.register(CONTESTED, sink(CONTESTED)) {
                        assert!(registry.unregister(CONTESTED));
                    }
                    for id in worker_ids(worker) {
                        assert!(registry.unregister(id));
                    }
                }

                for id in worker_ids(worker) {
                    assert!(registry.register(id, sink(id)));
                    if id.0 % 2 == 0 {
                        assert!(registry.unregister(id));
                    }
                }

                barrier.wait();
                registry.register(CONTESTED, sink(CONTESTED))
            })
        })
        .collect();

    let contested_wins = workers
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|won| *won)
        .count();
    done.store(true, Ordering::Release);
    fan_out.join().unwrap();

    assert_eq!(contested_wins, 1);

    let mut expected: Vec<UserId> = (0..WORKERS)
        .flat_map(worker_ids)
        .filter(|id| id.0 % 2 == 1)
        .chain(std::iter::once(CONTESTED))
        .collect();
    expected.sort();
    let mut ids = registry.client_ids();
    ids.sort();
    assert_eq!(ids, expected);

    assert_eq!(registry.len(), expected.len());
    assert_eq!(CONNECTED_CLIENTS.get() - before, i64::try_from(registry.len()).unwrap());
}
