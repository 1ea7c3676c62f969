//! Runtime: the single-consumer event loop that drives a coordinator.

pub mod control;

pub use control::{ControlConfig, ControlHandle, ControlPlane, Inbound};
