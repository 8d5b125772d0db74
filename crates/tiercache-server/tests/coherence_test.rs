mod helpers;

use std::time::Duration;

use helpers::{Fleet, eventually};
use tiercache_core::{BusEnvelope, InvalidationMessage, KeyPolicyRegistry, Resource};
use tiercache_remote::{Bus, DEFAULT_TOPIC, RemoteStore};

#[test]
fn nodes_resolve_to_one_hour_policy() {
    let spec = KeyPolicyRegistry::resolve("nodes");

    assert_eq!(spec.name(), "nodes");
    assert_eq!(spec.ttl_seconds(), 3600);
}

#[tokio::test]
async fn own_write_is_served_locally() {
    let fleet = Fleet::start(1).await;
    let a = fleet.instance(0);

    a.coordinator.set(&Resource::Nodes, b"X".to_vec()).await.unwrap();
    let reads = fleet.store.reads();

    assert_eq!(a.coordinator.get(&Resource::Nodes).await.as_deref(), Some(&b"X"[..]));
    assert_eq!(fleet.store.reads(), reads);

    fleet.shutdown().await;
}

#[tokio::test]
async fn write_on_one_instance_evicts_stale_copy_on_another() {
    let fleet = Fleet::start(2).await;
    let (a, b) = (fleet.instance(0), fleet.instance(1));

    // B caches the first version
    a.coordinator.set(&Resource::Nodes, b"W".to_vec()).await.unwrap();
    eventually(|| b.coordinator.metrics().applied() == 1).await;
    assert_eq!(b.coordinator.get(&Resource::Nodes).await.as_deref(), Some(&b"W"[..]));
    assert_eq!(b.local().get("nodes").as_deref(), Some(&b"W"[..]));

    a.coordinator.set(&Resource::Nodes, b"X".to_vec()).await.unwrap();
    eventually(|| b.local().get("nodes").is_none()).await;

    let reads = fleet.store.reads();
    assert_eq!(b.coordinator.get(&Resource::Nodes).await.as_deref(), Some(&b"X"[..]));
    assert_eq!(fleet.store.reads(), reads + 1);

    fleet.shutdown().await;
}

#[tokio::test]
async fn every_instance_converges_on_latest_write() {
    let fleet = Fleet::start(3).await;
    let mut expected_applied = [0u64; 3];

    for (round, writer) in [0usize, 1, 2, 1].into_iter().enumerate() {
        let value = format!("v{round}").into_bytes();
        fleet
            .instance(writer)
            .coordinator
            .set(&Resource::Economics, value.clone())
            .await
            .unwrap();

        for (index, instance) in fleet.instances.iter().enumerate() {
            if index != writer {
                expected_applied[index] += 1;
            }
            let expected = expected_applied[index];
            eventually(|| instance.coordinator.metrics().applied() == expected).await;
        }

        for instance in &fleet.instances {
            let seen = instance.coordinator.get(&Resource::Economics).await;
            assert_eq!(seen.as_deref(), Some(value.as_slice()), "round {round}");
        }
    }

    fleet.shutdown().await;
}

#[tokio::test]
async fn invalidate_clears_both_tiers_fleet_wide() {
    let fleet = Fleet::start(2).await;
    let (a, b) = (fleet.instance(0), fleet.instance(1));
    let resource = Resource::TxCount("erd1qqq".to_string());

    a.coordinator.set(&resource, b"12".to_vec()).await.unwrap();
    eventually(|| b.coordinator.metrics().applied() == 1).await;
    assert!(b.coordinator.get(&resource).await.is_some());

    a.coordinator.invalidate(&[resource.clone()]).await.unwrap();
    eventually(|| b.local().get("txCount:erd1qqq").is_none()).await;

    assert!(a.coordinator.get(&resource).await.is_none());
    assert!(b.coordinator.get(&resource).await.is_none());
    assert!(fleet.store.get("txCount:erd1qqq").await.unwrap().is_none());

    fleet.shutdown().await;
}

#[tokio::test]
async fn invalidating_absent_keys_is_a_noop() {
    let fleet = Fleet::start(2).await;
    let a = fleet.instance(0);

    a.coordinator.invalidate(&[Resource::Identities]).await.unwrap();
    a.coordinator.invalidate(&[Resource::Identities]).await.unwrap();
    a.coordinator.refresh(&[Resource::Identities]).await.unwrap();

    let b = fleet.instance(1);
    eventually(|| b.coordinator.metrics().applied() == 3).await;
    assert!(b.local().get("identities").is_none());

    fleet.shutdown().await;
}

#[tokio::test]
async fn operator_delete_message_reaches_every_instance() {
    let fleet = Fleet::start(3).await;
    for instance in &fleet.instances {
        instance.local().set("keybases", b"K".to_vec(), Duration::from_secs(3600));
        instance.local().set("providers", b"P".to_vec(), Duration::from_secs(3600));
    }

    let message = InvalidationMessage::delete_keys(["keybases", "unknown"]).unwrap();
    fleet
        .bus
        .publish(DEFAULT_TOPIC, &BusEnvelope::anonymous(message))
        .await
        .unwrap();

    for instance in &fleet.instances {
        eventually(|| instance.local().get("keybases").is_none()).await;
        assert!(instance.local().get("providers").is_some());
    }

    fleet.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn refresh_extends_ttl_on_other_instances() {
    let fleet = Fleet::start(2).await;
    let (a, b) = (fleet.instance(0), fleet.instance(1));
    b.local().set("shards", b"S".to_vec(), Duration::from_secs(60));

    tokio::time::advance(Duration::from_secs(50)).await;
    a.coordinator.refresh(&[Resource::ActiveShards]).await.unwrap();
    eventually(|| b.coordinator.metrics().applied() == 1).await;

    tokio::time::advance(Duration::from_secs(40)).await;
    assert_eq!(b.local().get("shards").as_deref(), Some(&b"S"[..]));

    fleet.shutdown().await;
}
