//! Automatic reload workers.
//!
//! Two mechanisms behind one behavior: OS file-system notifications
//! with a debounce window, degrading to fingerprint polling when a
//! watcher cannot be constructed. Either way the worker prepares the
//! new tree off to the side (inside `reload`) and readers only ever
//! see the atomic swap.

use std::collections::HashMap;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use strata_core::Fingerprint;
use strata_errors::StrataError;

use crate::manager::{ConfigManager, ReloadStrategy};

pub(crate) struct WatcherHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    pub(crate) fn stop(self) {
        let _ = self.shutdown.send(true);
        self.task.abort();
    }
}

pub(crate) fn spawn(manager: ConfigManager, strategy: ReloadStrategy) -> WatcherHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = match strategy {
        ReloadStrategy::Watch { debounce } => {
            tokio::spawn(watch_task(manager, debounce, shutdown_rx))
        }
        ReloadStrategy::Poll { interval } => {
            tokio::spawn(poll_task(manager, interval, shutdown_rx))
        }
        ReloadStrategy::Manual => tokio::spawn(async {}),
    };
    WatcherHandle {
        shutdown: shutdown_tx,
        task,
    }
}

async fn watch_task(
    manager: ConfigManager,
    debounce: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let dirs = manager.watched_directories().await;
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<()>();

    // The notify callback runs on the watcher's own thread; an
    // unbounded sender is safe to use from there.
    let watcher = RecommendedWatcher::new(
        move |result: Result<notify::Event, notify::Error>| {
            if let Ok(event) = result {
                if event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove() {
                    let _ = event_tx.send(());
                }
            }
        },
        notify::Config::default(),
    );

    let mut watcher = match watcher {
        Ok(watcher) => watcher,
        Err(err) => {
            warn!(error = %err, "file watcher unavailable, falling back to polling");
            poll_task(manager, Duration::from_secs(1), shutdown).await;
            return;
        }
    };
    for dir in &dirs {
        if let Err(err) = watcher.watch(dir, RecursiveMode::NonRecursive) {
            warn!(dir = %dir.display(), error = %err, "failed to watch directory");
        }
    }
    debug!(dirs = dirs.len(), "file watcher started");

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            event = event_rx.recv() => {
                if event.is_none() {
                    break;
                }
                // Let the burst of events from one editor save settle.
                tokio::time::sleep(debounce).await;
                while event_rx.try_recv().is_ok() {}
                match manager.reload().await {
                    Ok(()) => debug!("watcher-triggered reload complete"),
                    Err(StrataError::Disposed) => break,
                    Err(err) => warn!(error = %err, "watcher-triggered reload failed"),
                }
            }
        }
    }
    debug!("file watcher stopped");
}

async fn poll_task(
    manager: ConfigManager,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut seen: HashMap<String, Fingerprint> = HashMap::new();
    let mut primed = false;

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let fingerprints = manager.file_fingerprints().await;
                let dirty = primed
                    && fingerprints
                        .iter()
                        .any(|(origin, fp)| seen.get(origin) != Some(fp));
                seen = fingerprints.into_iter().collect();
                primed = true;
                if dirty {
                    match manager.reload().await {
                        Ok(()) => debug!("poll-triggered reload complete"),
                        Err(StrataError::Disposed) => break,
                        Err(err) => warn!(error = %err, "poll-triggered reload failed"),
                    }
                }
            }
        }
    }
    debug!("poll watcher stopped");
}
