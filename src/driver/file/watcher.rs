//! Filesystem watching and reload debouncing.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use crate::driver::file::FileState;
use crate::error::Result;
use crate::lifecycle::Shutdown;

/// Watch the directory of every dynamic file and spawn the debounce loop.
///
/// The returned watcher must be kept alive; dropping it stops event delivery.
pub(crate) fn spawn(
    state: Arc<FileState>,
    quiet: Duration,
    shutdown: &Shutdown,
) -> Result<RecommendedWatcher> {
    let runtime = Handle::try_current()
        .map_err(|_| notify::Error::generic("file watching requires a tokio runtime"))?;
    let (tx, rx) = mpsc::unbounded_channel();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if event.kind.is_modify() || event.kind.is_create() {
                    for path in event.paths {
                        let _ = tx.send(path);
                    }
                }
            }
            Err(e) => tracing::error!(error = %e, "File watch error"),
        },
        notify::Config::default(),
    )?;

    let mut dirs = HashSet::new();
    for path in state.dynamic_paths() {
        if let Some(dir) = path.parent() {
            if dirs.insert(dir.to_path_buf()) {
                watcher.watch(dir, RecursiveMode::NonRecursive)?;
                tracing::debug!(dir = %dir.display(), "Watching directory");
            }
        }
    }

    runtime.spawn(debounce_loop(state, rx, quiet, shutdown.subscribe()));
    tracing::info!(dirs = dirs.len(), debounce = ?quiet, "File watcher started");

    Ok(watcher)
}

/// Reload each file once its events have been quiet for `quiet`.
async fn debounce_loop(
    state: Arc<FileState>,
    mut events: mpsc::UnboundedReceiver<PathBuf>,
    quiet: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut deadlines: HashMap<usize, Instant> = HashMap::new();

    loop {
        let next = deadlines.values().min().copied();

        tokio::select! {
            _ = shutdown.recv() => break,
            event = events.recv() => match event {
                Some(path) => {
                    if let Some(idx) = state.dynamic_index(&path) {
                        deadlines.insert(idx, Instant::now() + quiet);
                    }
                }
                None => break,
            },
            _ = tokio::time::sleep_until(next.unwrap_or_else(Instant::now)), if next.is_some() => {
                let now = Instant::now();
                let due: Vec<usize> = deadlines
                    .iter()
                    .filter(|(_, deadline)| **deadline <= now)
                    .map(|(idx, _)| *idx)
                    .collect();

                for idx in due {
                    deadlines.remove(&idx);
                    state.reload(idx).await;
                }
            }
        }
    }

    tracing::debug!(pending = deadlines.len(), "File watcher stopped");
}
