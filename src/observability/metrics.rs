//! Metrics collection.
//!
//! # Metrics
//! - `dynconf_remote_reads_total` (counter): store reads by `kind` (point, range)
//! - `dynconf_cache_hits_total` (counter): lookups served locally, by `state` (present, absent)
//! - `dynconf_file_reloads_total` (counter): file reloads by `outcome` (ok, failed)
//! - `dynconf_watch_events_total` (counter): store watch events by `kind` (put, delete)
//! - `dynconf_hook_failures_total` (counter): failed or panicked hooks by `driver`
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Labels are small closed sets, never keys or paths

use metrics::counter;

pub fn record_remote_read(kind: &'static str) {
    counter!("dynconf_remote_reads_total", "kind" => kind).increment(1);
}

pub fn record_cache_hit(state: &'static str) {
    counter!("dynconf_cache_hits_total", "state" => state).increment(1);
}

pub fn record_file_reload(outcome: &'static str) {
    counter!("dynconf_file_reloads_total", "outcome" => outcome).increment(1);
}

pub fn record_watch_event(kind: &'static str) {
    counter!("dynconf_watch_events_total", "kind" => kind).increment(1);
}

pub fn record_hook_failure(driver: &'static str) {
    counter!("dynconf_hook_failures_total", "driver" => driver).increment(1);
}
