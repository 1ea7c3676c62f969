//! Span helpers for coordinator passes.

use tracing::Span;

/// Start a span for one coordinator pass (ingest, join, loss, completion).
///
/// The `pass.assigned` and `pass.dispatched` fields are declared empty and
/// filled by [`record_pass_result`].
pub fn start_pass_span(kind: &str, records: usize) -> Span {
    tracing::info_span!(
        "fairq.pass",
        "pass.kind" = kind,
        "pass.records" = records,
        "pass.assigned" = tracing::field::Empty,
        "pass.dispatched" = tracing::field::Empty,
    )
}

/// Record how many records were placed and how many items were shipped.
pub fn record_pass_result(span: &Span, assigned: usize, dispatched: usize) {
    span.record("pass.assigned", assigned);
    span.record("pass.dispatched", dispatched);
}
