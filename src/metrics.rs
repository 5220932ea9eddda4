//! Counters exported through the `metrics` facade.
//!
//! Nothing is recorded unless the application installs a recorder.

use metrics::counter;

pub const BUFFERS_DISPATCHED: &str = "pipeweld_split_buffers_dispatched_total";
pub const VALUES_DISPATCHED: &str = "pipeweld_split_values_dispatched_total";
pub const BRANCHES_RETIRED: &str = "pipeweld_split_branches_retired_total";
pub const CACHE_REPLAYS: &str = "pipeweld_cache_replays_total";

pub(crate) fn record_buffer(values: usize) {
    counter!(BUFFERS_DISPATCHED).increment(1);
    counter!(VALUES_DISPATCHED).increment(values as u64);
}

pub(crate) fn record_retired(kind: &'static str) {
    counter!(BRANCHES_RETIRED, "kind" => kind).increment(1);
}

pub(crate) fn record_cache_replay() {
    counter!(CACHE_REPLAYS).increment(1);
}
