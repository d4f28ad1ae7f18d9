//! Watch-stream multiplexer.
//!
//! # Responsibilities
//! - Coalesce observer prefixes into a bounded set of aggregate prefixes
//! - Open one long-lived watch stream per aggregate prefix
//! - Fan every event out to each observer whose prefix matches its key
//!
//! # Design Decisions
//! - Coalescing is greedy and depends on attach order; any grouping is
//!   correct, only the number of streams varies
//! - `attach` takes `&mut self`, so all attaches finish before `run`
//! - `run` is idempotent
//! - One observer failing or panicking never ends the stream task
//! - Nested prefixes each receive the same event independently

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::broadcast;

use crate::driver::hook::panic_message;
use crate::error::Result;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::store::{KvStore, WatchEvent, WatchStream};

/// Receives watch events for keys under its prefix.
pub trait Observer: Send + Sync {
    fn prefix(&self) -> &str;

    fn handle(&self, event: &WatchEvent) -> Result<()>;
}

pub struct Watcher {
    store: Arc<dyn KvStore>,
    observers: Vec<Arc<dyn Observer>>,
    prefixes: Vec<String>,
    common_prefix_min_len: usize,
    running: AtomicBool,
}

impl Watcher {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            observers: Vec::new(),
            prefixes: Vec::new(),
            common_prefix_min_len: 1,
            running: AtomicBool::new(false),
        }
    }

    /// Minimum shared leading length for two prefixes to share a stream.
    /// Values of 1 or less keep the default of 1.
    pub fn with_common_prefix_min_len(mut self, len: usize) -> Self {
        if len > 1 {
            self.common_prefix_min_len = len;
        }
        self
    }

    /// Add an observer, merging its prefix into the first aggregate it shares
    /// at least `common_prefix_min_len` leading bytes with.
    pub fn attach(&mut self, observer: Arc<dyn Observer>) {
        let prefix = observer.prefix();

        let merged = self.prefixes.iter_mut().any(|aggregate| {
            match common_prefix(prefix, aggregate, self.common_prefix_min_len) {
                Some(common) => {
                    let common = common.to_string();
                    *aggregate = common;
                    true
                }
                None => false,
            }
        });

        if !merged {
            self.prefixes.push(prefix.to_string());
        }
        self.observers.push(observer);
    }

    pub fn has_observer(&self, prefix: &str) -> bool {
        self.observers.iter().any(|o| o.prefix() == prefix)
    }

    /// Aggregate prefixes, one per watch stream.
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Open every watch stream and spawn its dispatch task.
    ///
    /// Returns once all streams are established. Tasks stop when `shutdown`
    /// triggers or their stream ends. Calling this again is a no-op.
    pub async fn run(&self, shutdown: &Shutdown) -> Result<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        let observers: Arc<[Arc<dyn Observer>]> = self.observers.clone().into();

        for prefix in &self.prefixes {
            let stream = self.store.watch(prefix).await?;
            tracing::debug!(prefix = %prefix, "Watching key prefix");

            tokio::spawn(watch_loop(
                prefix.clone(),
                stream,
                observers.clone(),
                shutdown.subscribe(),
            ));
        }

        Ok(())
    }
}

async fn watch_loop(
    prefix: String,
    mut stream: WatchStream,
    observers: Arc<[Arc<dyn Observer>]>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!(prefix = %prefix, "Watch stopped");
                return;
            }
            batch = stream.next() => match batch {
                Some(Ok(events)) => {
                    for event in &events {
                        fan_out(&observers, event);
                    }
                }
                Some(Err(e)) => {
                    tracing::error!(prefix = %prefix, error = %e, "Watch stream failed");
                    return;
                }
                None => {
                    tracing::warn!(prefix = %prefix, "Watch stream closed");
                    return;
                }
            }
        }
    }
}

fn fan_out(observers: &[Arc<dyn Observer>], event: &WatchEvent) {
    tracing::debug!(key = %event.key, kind = event.kind.as_str(), "Watch event");
    metrics::record_watch_event(event.kind.as_str());

    for observer in observers {
        if !event.key.starts_with(observer.prefix()) {
            continue;
        }

        match panic::catch_unwind(AssertUnwindSafe(|| observer.handle(event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(prefix = observer.prefix(), key = %event.key, error = %e, "Observer failed");
            }
            Err(payload) => {
                tracing::error!(
                    prefix = observer.prefix(),
                    key = %event.key,
                    panic = %panic_message(&payload),
                    "Observer panicked"
                );
            }
        }
    }
}

/// Longest common prefix of `a` and `b`, if it is at least `min_len` bytes.
fn common_prefix<'a>(a: &'a str, b: &str, min_len: usize) -> Option<&'a str> {
    let len = a
        .char_indices()
        .zip(b.chars())
        .find(|((_, ca), cb)| ca != cb)
        .map(|((i, _), _)| i)
        .unwrap_or_else(|| a.len().min(b.len()));

    if len < min_len {
        None
    } else {
        Some(&a[..len])
    }
}
