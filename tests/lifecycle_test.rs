//! Connection lifecycle under contention, driven through the public API
//! without a network transport

use std::sync::Arc;

use futures::stream;
use tokio::time::{timeout, Duration};

use sigrelay::connection::ConnectionHandle;
use sigrelay::metrics::Metrics;
use sigrelay::routing::LoopExit;
use sigrelay::{ConnectionManager, ConnectionRegistry};

fn manager() -> (Arc<ConnectionManager>, Arc<Metrics>) {
    let registry = Arc::new(ConnectionRegistry::new());
    let metrics = Arc::new(Metrics::new().unwrap());
    let manager = Arc::new(ConnectionManager::new(registry, Arc::clone(&metrics), 16));
    (manager, metrics)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_connections_on_one_identifier_all_clean_up() {
    let (manager, metrics) = manager();
    let mut tasks = Vec::new();
    let mut handles = Vec::new();

    for i in 0..32 {
        let (handle, queue) = ConnectionHandle::channel("shared", 16);
        handles.push(Arc::clone(&handle));

        let manager = Arc::clone(&manager);
        tasks.push(tokio::spawn(async move {
            let frames: Vec<Result<Vec<u8>, String>> = (0..10)
                .map(|n| {
                    Ok(format!(r#"{{"msg_type":"chat","message":"{}-{}","to":"shared"}}"#, i, n)
                        .into_bytes())
                })
                .collect();
            let summary = manager
                .serve_connection("shared".to_string(), handle, stream::iter(frames))
                .await;
            (summary, queue)
        }));
    }

    let mut queues = Vec::new();
    for task in tasks {
        let (summary, queue) = task.await.unwrap();
        assert_eq!(summary.exit, LoopExit::Closed);
        assert_eq!(summary.received, 10);
        queues.push(queue);
    }

    // Every loop has ended, so no stale entry may survive
    assert_eq!(manager.get_active_connections(), 0);
    assert!(manager.registry().lookup("shared").is_none());
    assert!(handles.iter().all(|handle| handle.is_closed()));
    assert!(handles.iter().all(|handle| !handle.close()));

    assert_eq!(metrics.get_total_connections(), 32);
    assert_eq!(metrics.get_active_connections(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_peers_exchange_messages() {
    let (manager, metrics) = manager();
    let peers = 16;

    // Register every peer first with an idle loop so lookups succeed
    let mut idle = Vec::new();
    let mut queues = Vec::new();
    for i in 0..peers {
        let peer_id = format!("peer-{}", i);
        let (handle, queue) = ConnectionHandle::channel(peer_id.clone(), 64);
        queues.push(queue);

        let manager = Arc::clone(&manager);
        idle.push(tokio::spawn(async move {
            let inbound = stream::pending::<Result<Vec<u8>, String>>();
            manager.serve_connection(peer_id, handle, inbound).await
        }));
    }

    timeout(Duration::from_secs(2), async {
        while manager.get_active_connections() != peers {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("peers did not register");

    // A second sender per peer writes to its right-hand neighbour
    let router = sigrelay::routing::Router::new(Arc::clone(manager.registry()), Arc::clone(&metrics));
    let mut senders = Vec::new();
    for i in 0..peers {
        let router = router.clone();
        senders.push(tokio::spawn(async move {
            let from = format!("peer-{}", i);
            let to = format!("peer-{}", (i + 1) % peers);
            let frame = format!(r#"{{"msg_type":"chat","message":"hello","to":"{}"}}"#, to);
            router.route(&from, frame.as_bytes())
        }));
    }
    for sender in senders {
        assert!(matches!(
            sender.await.unwrap(),
            sigrelay::routing::RouteOutcome::Forwarded { .. }
        ));
    }

    for (i, queue) in queues.iter_mut().enumerate() {
        let frame = queue.frames.recv().await.unwrap();
        let envelope = sigrelay::protocol::Envelope::decode(frame.as_bytes()).unwrap();
        assert_eq!(envelope.sender, format!("peer-{}", (i + peers - 1) % peers));
        assert_eq!(envelope.recipient, format!("peer-{}", i));
    }
    assert_eq!(metrics.get_messages_forwarded(), peers as u64);

    manager.initiate_shutdown();
    manager
        .wait_for_connections_to_close(Duration::from_secs(2))
        .await
        .unwrap();
    for task in idle {
        assert_eq!(task.await.unwrap().exit, LoopExit::Shutdown);
    }
}
