//! # fairq
//!
//! Fair dispatch of input records across a changing pool of workers.
//!
//! A [`coordinator::Coordinator`] owns a registry of per-worker queues. New
//! records are balanced across workers, rebalanced whenever a worker joins,
//! and shipped to each worker no faster than its admission cap allows. The
//! [`engine`] module drives a coordinator from a single event loop.

pub mod admission;
pub mod balance;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod event;
pub mod membership;
pub mod model;
pub mod registry;
pub mod sink;
pub mod source;
pub mod telemetry;
pub mod transport;
