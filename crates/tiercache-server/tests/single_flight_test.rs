mod helpers;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use futures_util::future::join_all;
use helpers::Fleet;
use tiercache_core::Resource;
use tiercache_remote::RemoteStore;
use tiercache_server::cache::Flight;
use tokio::sync::Barrier;

const LOCK_KEY: &str = "recompute:nodes";

#[tokio::test]
async fn concurrent_runs_across_instances_execute_once() {
    let fleet = Fleet::start(3).await;
    let executions = Arc::new(AtomicU32::new(0));

    let runs = (0..10).map(|i| {
        let instance = fleet.instance(i % 3);
        let executions = executions.clone();
        async move {
            instance
                .lock
                .run(LOCK_KEY, Duration::from_secs(6), || async {
                    executions.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    instance
                        .coordinator
                        .set(&Resource::Nodes, b"recomputed".to_vec())
                        .await?;
                    Ok(())
                })
                .await
        }
    });
    let results = join_all(runs).await;

    let completed = results
        .iter()
        .filter(|r| matches!(r, Ok(Flight::Completed(()))))
        .count();
    let skipped = results
        .iter()
        .filter(|r| matches!(r, Ok(Flight::Skipped)))
        .count();

    assert_eq!(executions.load(Ordering::SeqCst), 1);
    assert_eq!(completed, 1);
    assert_eq!(skipped, 9);

    // Skippers read the winner's value through the normal path
    for instance in &fleet.instances {
        assert_eq!(
            instance.coordinator.get(&Resource::Nodes).await.as_deref(),
            Some(&b"recomputed"[..])
        );
    }
    assert!(fleet.store.get(LOCK_KEY).await.unwrap().is_none());

    fleet.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn spawned_runs_across_instances_execute_once() {
    let fleet = Fleet::start(3).await;
    let executions = Arc::new(AtomicU32::new(0));
    let start = Arc::new(Barrier::new(10));

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let lock = fleet.instance(i % 3).lock.clone();
            let coordinator = fleet.instance(i % 3).coordinator.clone();
            let executions = executions.clone();
            let start = start.clone();
            tokio::spawn(async move {
                start.wait().await;
                lock.run(LOCK_KEY, Duration::from_secs(6), || async move {
                    executions.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    coordinator
                        .set(&Resource::Nodes, b"recomputed".to_vec())
                        .await?;
                    Ok(())
                })
                .await
            })
        })
        .collect();

    let mut completed = 0;
    let mut skipped = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(Flight::Completed(())) => completed += 1,
            Ok(Flight::Skipped) => skipped += 1,
            Err(e) => panic!("unexpected lock error: {e}"),
        }
    }

    assert_eq!(executions.load(Ordering::SeqCst), 1);
    assert_eq!((completed, skipped), (1, 9));
    assert!(fleet.store.get(LOCK_KEY).await.unwrap().is_none());

    fleet.shutdown().await;
}

#[tokio::test]
async fn failed_action_reaches_only_the_holder() {
    let fleet = Fleet::start(2).await;
    let (a, b) = (fleet.instance(0), fleet.instance(1));

    let holder = a.lock.run(LOCK_KEY, Duration::from_secs(6), || async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        anyhow::bail!("gateway unreachable")
    });
    let skipper = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        b.lock
            .run(LOCK_KEY, Duration::from_secs(6), || async { Ok(()) })
            .await
    };
    let (holder, skipper): (Result<Flight<()>, _>, _) = tokio::join!(holder, skipper);

    assert!(holder.is_err());
    assert!(matches!(skipper, Ok(Flight::Skipped)));

    // Released despite the failure
    let retry = b.lock.run(LOCK_KEY, Duration::from_secs(6), || async { Ok(()) }).await;
    assert!(matches!(retry, Ok(Flight::Completed(()))));

    fleet.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn crashed_holder_lock_expires_after_ttl() {
    let fleet = Fleet::start(2).await;
    // A holder that never releases
    assert!(
        fleet
            .store
            .set_if_absent(LOCK_KEY, b"true", Duration::from_secs(6))
            .await
            .unwrap()
    );

    let b = fleet.instance(1);
    let blocked = b.lock.run(LOCK_KEY, Duration::from_secs(6), || async { Ok(()) }).await;
    assert!(matches!(blocked, Ok(Flight::Skipped)));

    tokio::time::advance(Duration::from_secs(6)).await;

    let recovered = b.lock.run(LOCK_KEY, Duration::from_secs(6), || async { Ok(()) }).await;
    assert!(matches!(recovered, Ok(Flight::Completed(()))));

    fleet.shutdown().await;
}
