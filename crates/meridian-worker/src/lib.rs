//! Meridian worker: wires the event backbone into one process.
//!
//! Builds the store, log, bus and read model from environment
//! configuration, runs the consumer roles, and serves health probes and
//! read-only report endpoints.

pub mod config;
pub mod error;
pub mod read_model;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod wiring;
