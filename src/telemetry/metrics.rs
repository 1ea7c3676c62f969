//! Metric instrument factories for fairq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"fairq"` meter.

use opentelemetry::metrics::{Counter, Meter};

/// Returns the shared meter for fairq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("fairq")
}

/// Counter: records received from the record source.
pub fn records_ingested() -> Counter<u64> {
    meter()
        .u64_counter("fairq.records.ingested")
        .with_description("Number of records received from the source")
        .build()
}

/// Counter: records parked because no worker was registered.
pub fn records_buffered() -> Counter<u64> {
    meter()
        .u64_counter("fairq.records.buffered")
        .with_description("Number of records held while no workers were registered")
        .build()
}

/// Counter: chunks handed to the transport.
pub fn chunks_dispatched() -> Counter<u64> {
    meter()
        .u64_counter("fairq.chunks.dispatched")
        .with_description("Number of chunks handed to the transport")
        .build()
}

/// Counter: work items promoted to working.
/// Labels: `worker`.
pub fn items_dispatched() -> Counter<u64> {
    meter()
        .u64_counter("fairq.items.dispatched")
        .with_description("Number of work items promoted to working")
        .build()
}

/// Counter: working items retired by completion reports.
pub fn items_completed() -> Counter<u64> {
    meter()
        .u64_counter("fairq.items.completed")
        .with_description("Number of working items retired by completion reports")
        .build()
}

/// Counter: worker membership changes.
/// Labels: `change` ("joined" | "lost").
pub fn membership_changes() -> Counter<u64> {
    meter()
        .u64_counter("fairq.workers.membership_changes")
        .with_description("Number of worker joins and losses")
        .build()
}

/// Counter: working items abandoned when their worker was lost.
pub fn items_abandoned() -> Counter<u64> {
    meter()
        .u64_counter("fairq.items.abandoned")
        .with_description("Working items lost with their worker")
        .build()
}

/// Counter: distribution passes aborted on an invariant violation.
pub fn passes_aborted() -> Counter<u64> {
    meter()
        .u64_counter("fairq.passes.aborted")
        .with_description("Distribution passes aborted on an invariant violation")
        .build()
}
