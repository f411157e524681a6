//! Automatic reload behavior: watch mode, poll mode, callback
//! ordering, swap atomicity.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;

use strata::{ConfigManager, JsonSource, ReloadStrategy};

fn bump_mtime(path: &Path) {
    let file = std::fs::OpenOptions::new().append(true).open(path).unwrap();
    let _ = file.set_modified(std::time::SystemTime::now() + Duration::from_secs(2));
}

async fn wait_until<F>(mut probe: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if probe() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn watch_mode_swaps_and_fires_callbacks_in_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.json");
    std::fs::write(&path, r#"{"v": 1}"#).unwrap();

    let manager = ConfigManager::builder()
        .add_source(Arc::new(JsonSource::new(&path)))
        .with_reload_strategy(ReloadStrategy::Watch {
            debounce: Duration::from_millis(100),
        })
        .build()
        .await
        .unwrap();

    // Each callback records its label and the value it observed; the
    // tree handed to callbacks is the post-swap tree.
    let seen: Arc<Mutex<Vec<(&'static str, Value)>>> = Arc::new(Mutex::new(Vec::new()));
    let s1 = seen.clone();
    manager.on_reload(move |tree| s1.lock().unwrap().push(("cb1", tree["v"].clone())));
    let s2 = seen.clone();
    manager.on_reload(move |tree| s2.lock().unwrap().push(("cb2", tree["v"].clone())));

    // Give the watcher a moment to install its directory watches.
    tokio::time::sleep(Duration::from_millis(200)).await;

    std::fs::write(&path, r#"{"v": 2}"#).unwrap();
    bump_mtime(&path);

    let fired = wait_until(|| seen.lock().unwrap().len() >= 2, Duration::from_secs(5)).await;
    assert!(fired, "watch-mode callbacks did not fire");

    let events = seen.lock().unwrap().clone();
    assert_eq!(events[0], ("cb1", json!(2)));
    assert_eq!(events[1], ("cb2", json!(2)));
    assert_eq!(manager.get_int("v", 0).await, 2);

    manager.dispose().await;
}

#[tokio::test]
async fn poll_mode_picks_up_fingerprint_changes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.json");
    std::fs::write(&path, r#"{"v": 1}"#).unwrap();

    let manager = ConfigManager::builder()
        .add_source(Arc::new(JsonSource::new(&path)))
        .with_reload_strategy(ReloadStrategy::Poll {
            interval: Duration::from_millis(100),
        })
        .build()
        .await
        .unwrap();
    assert_eq!(manager.get_int("v", 0).await, 1);

    // Let the poller prime its fingerprint view first.
    tokio::time::sleep(Duration::from_millis(250)).await;
    std::fs::write(&path, r#"{"v": 2}"#).unwrap();
    bump_mtime(&path);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let mut updated = false;
    while tokio::time::Instant::now() < deadline {
        if manager.get_int("v", 0).await == 2 {
            updated = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(updated, "poll mode never observed the new tree");

    manager.dispose().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_readers_observe_monotonic_versions() {
    let manager = ConfigManager::builder()
        .add_source(Arc::new(strata::MemorySource::new(json!({"n": 0}))))
        .build()
        .await
        .unwrap();

    let reader = manager.clone();
    let reads = tokio::spawn(async move {
        let mut last = 0i64;
        for _ in 0..500 {
            let n = reader.get_int("n", -1).await;
            assert!(n >= last, "observed tree went backwards: {n} < {last}");
            last = n;
            tokio::task::yield_now().await;
        }
    });

    for i in 1..=20 {
        manager
            .add_source(Arc::new(strata::MemorySource::labeled(
                &format!("step-{i}"),
                json!({"n": i}),
            )))
            .await
            .unwrap();
    }
    reads.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn callbacks_from_overlapping_swaps_do_not_interleave() {
    let manager = ConfigManager::builder()
        .add_source(Arc::new(strata::MemorySource::new(json!({"n": 0}))))
        .build()
        .await
        .unwrap();

    let events: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let e1 = events.clone();
    manager.on_reload(move |_| {
        e1.lock().unwrap().push("first");
        // Long enough for a concurrent swap to try to run its own set.
        std::thread::sleep(Duration::from_millis(80));
    });
    let e2 = events.clone();
    manager.on_reload(move |_| e2.lock().unwrap().push("second"));

    let m1 = manager.clone();
    let swap_a = tokio::spawn(async move {
        m1.add_source(Arc::new(strata::MemorySource::labeled("a", json!({"n": 1}))))
            .await
            .unwrap();
    });
    let m2 = manager.clone();
    let swap_b = tokio::spawn(async move {
        m2.add_source(Arc::new(strata::MemorySource::labeled("b", json!({"m": 2}))))
            .await
            .unwrap();
    });
    swap_a.await.unwrap();
    swap_b.await.unwrap();

    let seen = events.lock().unwrap().clone();
    assert_eq!(seen.len(), 4, "two swaps, two callbacks each: {seen:?}");
    // Per-swap serialization: each "first" is immediately followed by
    // its own "second".
    assert_eq!(seen[0], "first");
    assert_eq!(seen[1], "second");
    assert_eq!(seen[2], "first");
    assert_eq!(seen[3], "second");
}

#[tokio::test]
async fn dispose_stops_the_watcher() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.json");
    std::fs::write(&path, r#"{"v": 1}"#).unwrap();

    let manager = ConfigManager::builder()
        .add_source(Arc::new(JsonSource::new(&path)))
        .with_reload_strategy(ReloadStrategy::Poll {
            interval: Duration::from_millis(50),
        })
        .build()
        .await
        .unwrap();

    manager.dispose().await;
    std::fs::write(&path, r#"{"v": 2}"#).unwrap();
    bump_mtime(&path);
    tokio::time::sleep(Duration::from_millis(300)).await;

    // The last good tree is still served and never replaced.
    assert_eq!(manager.get_int("v", 0).await, 1);
}
