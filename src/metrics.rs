use tracing::trace;

// Trace-based counters; a subscriber filtering on `catmap.metrics` can
// aggregate them without a metrics backend.

pub fn record_outcome(outcome: &'static str) {
    trace!(
        target: "catmap.metrics",
        outcome = outcome,
        "label_outcome_inc"
    );
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target: "catmap.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}
