// Coordinator tests, compiled only via #[cfg(test)] in materialize/mod.rs

use std::sync::Arc;
use std::time::Duration;
use futures::future::join_all;
use crate::census_table::projection::KEY_COLUMN;
use crate::error::MaterializeError;
use crate::materialize::{MaterializationCoordinator, MaterializationStatus};
use crate::unit_tests::fixtures::{write_sample_file, KNOWN_IDENTITY};
use crate::unit_tests::scripted_fetcher::ScriptedFetcher;

fn sample_path(dir: &tempfile::TempDir) -> std::path::PathBuf {
    write_sample_file(dir.path(), "censo.parquet", 100)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_build() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(ScriptedFetcher::new(sample_path(&dir)).with_delay(Duration::from_millis(100)));
    let coordinator = Arc::new(MaterializationCoordinator::new(fetcher.clone()));

    let callers = (0..16).map(|_| {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.ensure_ready().await })
    });
    let tables: Vec<_> = join_all(callers)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(fetcher.calls(), 1);
    assert_eq!(coordinator.build_attempts(), 1);
    assert!(tables.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    assert!(tables[0].has_index(KEY_COLUMN));
}

#[tokio::test]
async fn ready_state_is_served_without_rebuilding() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(ScriptedFetcher::new(sample_path(&dir)).with_delay(Duration::from_millis(300)));
    let coordinator = MaterializationCoordinator::new(fetcher.clone());

    let first = coordinator.ensure_ready().await.unwrap();
    // A second build would sleep for 300ms in the fetcher.
    let second = tokio::time::timeout(Duration::from_millis(100), coordinator.ensure_ready())
        .await
        .expect("ready path must not wait")
        .unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(coordinator.status(), MaterializationStatus::Ready { rows: 103 });
    assert!(coordinator.table().is_some());
}

#[tokio::test]
async fn failure_is_not_sticky() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(ScriptedFetcher::new(sample_path(&dir)).failing_first(1));
    let coordinator = MaterializationCoordinator::new(fetcher.clone());

    let err = coordinator.ensure_ready().await.unwrap_err();
    assert!(matches!(err, MaterializeError::Fetch(_)), "got {err:?}");
    assert!(matches!(coordinator.status(), MaterializationStatus::Failed { episode: 1, .. }));
    assert!(coordinator.table().is_none());

    let table = coordinator.ensure_ready().await.unwrap();
    assert!(table.lookup_by_key(KNOWN_IDENTITY).is_some());
    assert_eq!(fetcher.calls(), 2);
    assert_eq!(coordinator.build_attempts(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failure_fans_out_to_every_waiter_of_the_episode() {
    let dir = tempfile::tempdir().unwrap();
    let (fetcher, gate) = ScriptedFetcher::new(sample_path(&dir)).failing_first(1).gated();
    let fetcher = Arc::new(fetcher);
    let coordinator = Arc::new(MaterializationCoordinator::new(fetcher.clone()));

    let waiters: Vec<_> = (0..8)
        .map(|_| {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.ensure_ready().await })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(50)).await;
    gate.open();

    for waiter in join_all(waiters).await {
        let err = waiter.unwrap().unwrap_err();
        assert!(matches!(err, MaterializeError::Fetch(_)), "got {err:?}");
    }
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn waiters_stay_blocked_until_the_build_completes() {
    let dir = tempfile::tempdir().unwrap();
    let (fetcher, gate) = ScriptedFetcher::new(sample_path(&dir)).gated();
    let fetcher = Arc::new(fetcher);
    let coordinator = Arc::new(MaterializationCoordinator::new(fetcher.clone()));

    let waiters: Vec<_> = (0..5)
        .map(|_| {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.ensure_ready().await })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(waiters.iter().all(|w| !w.is_finished()));
    assert_eq!(coordinator.status(), MaterializationStatus::Building { episode: 1 });
    assert!(coordinator.table().is_none());

    gate.open();
    for waiter in join_all(waiters).await {
        let table = waiter.unwrap().unwrap();
        assert_eq!(table.num_rows(), 103);
    }
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn timed_out_waiter_leaves_the_build_running() {
    let dir = tempfile::tempdir().unwrap();
    let (fetcher, gate) = ScriptedFetcher::new(sample_path(&dir)).gated();
    let fetcher = Arc::new(fetcher);
    let coordinator = MaterializationCoordinator::new(fetcher.clone())
        .with_wait_timeout(Some(Duration::from_millis(50)));

    let err = coordinator.ensure_ready().await.unwrap_err();
    assert!(matches!(err, MaterializeError::Timeout(_)), "got {err:?}");

    gate.open();
    let coordinator = coordinator.with_wait_timeout(None);
    coordinator.ensure_ready().await.unwrap();
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn load_failure_is_reported_and_retried() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corrupt.parquet");
    std::fs::write(&path, b"definitely not parquet").unwrap();
    let fetcher = Arc::new(ScriptedFetcher::new(path));
    let coordinator = MaterializationCoordinator::new(fetcher.clone());

    let err = coordinator.ensure_ready().await.unwrap_err();
    assert!(matches!(err, MaterializeError::Load(_)), "got {err:?}");
    assert!(err.to_string().starts_with("dataset load failed"));

    coordinator.ensure_ready().await.unwrap_err();
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn start_triggers_a_background_build() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(ScriptedFetcher::new(sample_path(&dir)));
    let coordinator = MaterializationCoordinator::new(fetcher.clone());
    assert_eq!(coordinator.status(), MaterializationStatus::Unstarted);

    coordinator.start();
    coordinator.start();
    coordinator.ensure_ready().await.unwrap();

    assert_eq!(fetcher.calls(), 1);
    assert_eq!(coordinator.build_attempts(), 1);
}

#[tokio::test]
async fn instances_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let first_fetcher = Arc::new(ScriptedFetcher::new(sample_path(&dir)));
    let second_fetcher = Arc::new(ScriptedFetcher::new(sample_path(&dir)).failing_first(1));
    let first = MaterializationCoordinator::new(first_fetcher.clone());
    let second = MaterializationCoordinator::new(second_fetcher.clone());

    first.ensure_ready().await.unwrap();
    assert!(second.ensure_ready().await.is_err());

    assert_eq!(first_fetcher.calls(), 1);
    assert_eq!(second_fetcher.calls(), 1);
    assert!(first.table().is_some());
    assert!(second.table().is_none());
}
