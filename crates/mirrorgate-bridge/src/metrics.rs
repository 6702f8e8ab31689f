// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics. Nothing is exported unless a recorder is
//! installed.

use metrics::{describe_counter, describe_gauge, describe_histogram};
use mirrorgate_core::types::Direction;
use mirrorgate_core::FailureKind;

/// Register all Mirrorgate metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "mirrorgate_messages_ingested_total",
        "Messages written to the message store"
    );
    describe_counter!(
        "mirrorgate_relations_synced_total",
        "Relations that reached the synced state"
    );
    describe_counter!(
        "mirrorgate_relations_failed_total",
        "Mirror or session attempts that failed"
    );
    describe_counter!(
        "mirrorgate_echoes_suppressed_total",
        "Mirror events recognized as our own relay"
    );
    describe_counter!(
        "mirrorgate_mirror_conflicts_total",
        "Mirror copies orphaned because another writer assigned the relation first"
    );
    describe_gauge!(
        "mirrorgate_session_workers",
        "Currently running per-session workers"
    );
    describe_histogram!(
        "mirrorgate_mirror_call_seconds",
        "Mirror-system call latency in seconds"
    );
}

/// Record a message written to the store.
pub fn record_message_ingested(direction: Direction) {
    metrics::counter!("mirrorgate_messages_ingested_total", "direction" => direction.to_string())
        .increment(1);
}

/// Record a relation transition to synced.
pub fn record_relation_synced() {
    metrics::counter!("mirrorgate_relations_synced_total").increment(1);
}

/// Record a failed attempt.
pub fn record_relation_failed(kind: FailureKind) {
    metrics::counter!("mirrorgate_relations_failed_total", "kind" => kind.to_string())
        .increment(1);
}

/// Record a suppressed echo.
pub fn record_echo_suppressed() {
    metrics::counter!("mirrorgate_echoes_suppressed_total").increment(1);
}

/// Record a mirror copy created after the relation already had one.
pub fn record_mirror_conflict() {
    metrics::counter!("mirrorgate_mirror_conflicts_total").increment(1);
}

/// Set the number of running session workers.
pub fn set_session_workers(count: usize) {
    metrics::gauge!("mirrorgate_session_workers").set(count as f64);
}

/// Record mirror-system call latency.
pub fn record_mirror_call(seconds: f64) {
    metrics::histogram!("mirrorgate_mirror_call_seconds").record(seconds);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_a_recorder_is_a_noop() {
        register_metrics();
        record_message_ingested(Direction::FromOther);
        record_relation_synced();
        record_relation_failed(FailureKind::Permanent);
        record_echo_suppressed();
        record_mirror_conflict();
        set_session_workers(3);
        record_mirror_call(0.25);
    }
}
