//! Persistence across reopen, driven through the coordinator

use std::sync::Arc;

use lever_core::{Coordinator, EpsilonGreedy, Error, ExpiryIndex, Origin, RecordStore};
use lever_store::{TursoDatabase, TursoExpiryIndex, TursoRecordStore};
use tempfile::TempDir;

fn features() -> Vec<String> {
    vec!["red".into(), "green".into(), "blue".into()]
}

async fn open(dir: &TempDir) -> (Coordinator, TursoRecordStore, TursoExpiryIndex) {
    let db = TursoDatabase::new_local(&dir.path().join("lever.db"))
        .await
        .unwrap();
    let store = TursoRecordStore::new(db.clone());
    let index = TursoExpiryIndex::new(db);
    let coordinator = Coordinator::new(
        Arc::new(EpsilonGreedy::new(3, 0.1).unwrap()),
        Arc::new(store.clone()),
        Arc::new(index.clone()),
        features(),
    )
    .unwrap();
    (coordinator, store, index)
}

#[tokio::test]
async fn state_survives_reopen() {
    let dir = TempDir::new().unwrap();

    let (pending_id, resolved_id) = {
        let (coordinator, _, _) = open(&dir).await;
        let resolved = coordinator.select_with_draw(0.5).await.unwrap();
        coordinator
            .resolve(resolved.id, resolved.arm, 1.0, Origin::Update)
            .await
            .unwrap();
        let pending = coordinator.select_with_draw(0.5).await.unwrap();
        (pending.id, resolved.id)
    };

    let (coordinator, store, index) = open(&dir).await;
    assert_eq!(store.count().await.unwrap(), 2);
    assert!(!store.get(resolved_id).await.unwrap().is_pending());
    assert!(store.get(pending_id).await.unwrap().is_pending());

    let report = coordinator.recover().await.unwrap();
    assert_eq!(report.replayed, 1);
    assert_eq!(report.reindexed, 1);
    assert_eq!(coordinator.stats().counts, vec![1, 0, 0]);
    assert_eq!(index.len().await.unwrap(), 1);
}

#[tokio::test]
async fn sweep_force_resolves_persisted_selection() {
    let dir = TempDir::new().unwrap();
    let (coordinator, store, index) = open(&dir).await;
    let selection = coordinator.select().await.unwrap();

    let report = coordinator
        .sweep(chrono::Duration::zero())
        .await
        .unwrap();

    assert_eq!(report.resolved, 1);
    let stored = store.get(selection.id).await.unwrap();
    assert_eq!(stored.origin, Origin::Sweep);
    assert_eq!(stored.outcome(), Some(0.0));
    assert_eq!(index.len().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_resolves_count_once() {
    let dir = TempDir::new().unwrap();
    let (coordinator, store, index) = open(&dir).await;
    let coordinator = Arc::new(coordinator);
    let selection = coordinator.select_with_draw(0.5).await.unwrap();
    let (id, arm) = (selection.id, selection.arm);

    let mut tasks = Vec::new();
    for i in 0..16 {
        let coordinator = coordinator.clone();
        let origin = if i % 2 == 0 { Origin::Update } else { Origin::Sweep };
        tasks.push(tokio::spawn(async move {
            coordinator.resolve(id, arm, 1.0, origin).await
        }));
    }

    let mut ok = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => ok += 1,
            Err(Error::AlreadyResolved(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(ok, 1);
    assert_eq!(coordinator.stats().counts.iter().sum::<u64>(), 1);
    assert!(!store.get(id).await.unwrap().is_pending());
    assert_eq!(index.len().await.unwrap(), 0);
}
