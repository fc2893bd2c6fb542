//! Many producers feeding one registry through a task group.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use shipwright_core::artifact::{self, extra, Artifact, ArtifactType, Artifacts};
use shipwright_core::{Error, TaskGroup};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[tokio::test]
async fn test_producers_share_registry() {
    let artifacts = Artifacts::new();
    let mut group = TaskGroup::new(4);
    for i in 0..40 {
        let artifacts = artifacts.clone();
        group.spawn(async move {
            let goos = if i % 2 == 0 { "linux" } else { "darwin" };
            artifacts.add(
                Artifact::new(format!("bin{i}"), format!("dist/bin{i}"), ArtifactType::Binary)
                    .with_extra(extra::GOOS, goos),
            );
            Ok(())
        });
    }
    group.wait().await.unwrap();

    assert_eq!(artifacts.len(), 40);
    assert_eq!(artifacts.filter(&artifact::by_goos("linux")).len(), 20);
    assert_eq!(artifacts.group_by_platform().len(), 2);
}

#[tokio::test]
async fn test_limit_holds_and_failures_aggregate() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut group = TaskGroup::new(2);
    for i in 0..8 {
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        group.spawn(async move {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            running.fetch_sub(1, Ordering::SeqCst);
            if i % 4 == 0 {
                return Err(Error::config(format!("task {i} failed"), ""));
            }
            Ok(())
        });
    }

    let err = group.wait().await.unwrap_err();
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(err.failure_count(), 2);
    let message = err.to_string();
    assert!(message.contains("task 0 failed") && message.contains("task 4 failed"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_filtered_snapshots_ignore_concurrent_adds() {
    const BINARIES: usize = 50;
    let artifacts = Artifacts::new();
    let writers_done = Arc::new(AtomicUsize::new(0));
    let mut group = TaskGroup::new(8);

    {
        let artifacts = artifacts.clone();
        let writers_done = Arc::clone(&writers_done);
        group.spawn(async move {
            for i in 0..BINARIES {
                artifacts.add(Artifact::new(
                    format!("bin{i}"),
                    format!("dist/bin{i}"),
                    ArtifactType::Binary,
                ));
                tokio::task::yield_now().await;
            }
            writers_done.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }
    for w in 0..3 {
        let artifacts = artifacts.clone();
        let writers_done = Arc::clone(&writers_done);
        group.spawn(async move {
            for i in 0..200 {
                artifacts.add(Artifact::new(
                    format!("archive{w}_{i}"),
                    format!("dist/archive{w}_{i}.tar.gz"),
                    ArtifactType::UploadableArchive,
                ));
                tokio::task::yield_now().await;
            }
            writers_done.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }

    let snapshots = Arc::new(AtomicUsize::new(0));
    for _ in 0..4 {
        let artifacts = artifacts.clone();
        let writers_done = Arc::clone(&writers_done);
        let snapshots = Arc::clone(&snapshots);
        group.spawn(async move {
            let binaries = artifact::by_type(ArtifactType::Binary);
            loop {
                let finished = writers_done.load(Ordering::SeqCst) == 4;
                let names: Vec<String> = artifacts
                    .filter(&binaries)
                    .list()
                    .into_iter()
                    .map(|a| a.name)
                    .collect();
                let expected: Vec<String> =
                    (0..names.len()).map(|i| format!("bin{i}")).collect();
                if names != expected {
                    return Err(Error::config(format!("torn snapshot: {names:?}"), ""));
                }
                snapshots.fetch_add(1, Ordering::SeqCst);
                if finished {
                    if names.len() != BINARIES {
                        return Err(Error::config("missing binaries", ""));
                    }
                    return Ok(());
                }
                tokio::task::yield_now().await;
            }
        });
    }

    group.wait().await.unwrap();
    assert!(snapshots.load(Ordering::SeqCst) >= 4);
    assert_eq!(artifacts.len(), BINARIES + 600);
}
