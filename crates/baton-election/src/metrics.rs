// Metrics for election outcomes, work iterations and lock releases
// Recorded through the `metrics` facade; without an installed recorder they are no-ops

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Register metric descriptions.
/// Should be called once at application startup
pub fn describe_metrics() {
    describe_counter!(
        "baton_election_attempts_total",
        "Election attempts by outcome (elected, denied, unavailable)"
    );
    describe_counter!(
        "baton_work_iterations_total",
        "Completed units of work"
    );
    describe_counter!("baton_work_failures_total", "Failed units of work");
    describe_counter!(
        "baton_lock_release_total",
        "Lock release attempts by result (released, already_released, failed)"
    );
    describe_gauge!("baton_leader", "1 while this instance runs a work loop");
    describe_histogram!(
        "baton_leadership_duration_seconds",
        "Wall time from acquisition to release"
    );

    tracing::debug!("Election metrics described");
}

pub fn record_election(outcome: &'static str) {
    counter!("baton_election_attempts_total", "outcome" => outcome).increment(1);
}

pub fn record_iteration() {
    counter!("baton_work_iterations_total").increment(1);
}

pub fn record_work_failure() {
    counter!("baton_work_failures_total").increment(1);
}

pub fn record_release(result: &'static str) {
    counter!("baton_lock_release_total", "result" => result).increment(1);
}

pub fn set_leader(leading: bool) {
    gauge!("baton_leader").set(if leading { 1.0 } else { 0.0 });
}

pub fn record_leadership_duration(secs: f64) {
    histogram!("baton_leadership_duration_seconds").record(secs);
}
