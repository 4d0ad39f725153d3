//! Timer-driven eviction on a tokio runtime

mod fixtures;

use std::sync::Arc;

use chrono::Duration;
use fixtures::{baseline, t0};
use hidemenot::{
    ArtifactKind, ArtifactLookup, ArtifactStore, EvictionScheduler, ManualClock,
    MemoryArtifactStore, MemorySecretStore, SecretLifecycleManager, SecretStore, TokioScheduler,
};
use tokio::runtime::Handle;

#[tokio::test(start_paused = true)]
async fn test_timers_evict_without_sweeping() {
    let clock = ManualClock::new(t0());
    let scheduler = Arc::new(TokioScheduler::new(Handle::current(), Arc::new(clock.clone())));
    let artifacts = Arc::new(MemoryArtifactStore::new());
    let secrets = Arc::new(MemorySecretStore::new());
    let manager = SecretLifecycleManager::builder(artifacts.clone(), secrets.clone())
        .clock(Arc::new(clock.clone()))
        .scheduler(scheduler.clone())
        .baseline(baseline())
        .open()
        .unwrap();

    let receipt = manager.trigger().unwrap();
    let log = receipt.artifact(ArtifactKind::Log).unwrap().name.clone();
    let image = receipt.artifact(ArtifactKind::MarkedImage).unwrap().name.clone();
    assert_eq!(scheduler.pending(), 4);

    // Wall clock and runtime clock move together.
    clock.advance(Duration::seconds(121));
    tokio::time::sleep(std::time::Duration::from_secs(121)).await;

    assert_eq!(scheduler.pending(), 1);
    assert!(!artifacts.contains(&log).unwrap());
    assert!(secrets.get(&receipt.secret).unwrap().is_none());
    assert!(matches!(
        manager.lookup_artifact(&image),
        ArtifactLookup::Content(_)
    ));

    clock.advance(Duration::seconds(120));
    tokio::time::sleep(std::time::Duration::from_secs(120)).await;
    assert_eq!(scheduler.pending(), 0);
    assert!(artifacts.list().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_redeem_cancels_secret_timer() {
    let clock = ManualClock::new(t0());
    let scheduler = Arc::new(TokioScheduler::new(Handle::current(), Arc::new(clock.clone())));
    let secrets = Arc::new(MemorySecretStore::new());
    let manager = SecretLifecycleManager::builder(
        Arc::new(MemoryArtifactStore::new()),
        secrets.clone(),
    )
    .clock(Arc::new(clock.clone()))
    .scheduler(scheduler.clone())
    .baseline(baseline())
    .open()
    .unwrap();

    let receipt = manager.trigger().unwrap();
    manager.redeem(&receipt.secret, hidemenot::Redeemer::new("alice"));
    assert_eq!(scheduler.pending(), 3);

    clock.advance(Duration::seconds(300));
    tokio::time::sleep(std::time::Duration::from_secs(300)).await;
    assert_eq!(scheduler.pending(), 0);
    assert!(secrets.get(&receipt.secret).unwrap().unwrap().redeemed_by.is_some());
}
