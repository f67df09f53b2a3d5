//! Meridian Core: domain event model and infrastructure contracts.
//!
//! This crate defines the event envelope, its payload variants, the audit
//! categories, and the traits that the event store and the distributed log
//! implement. It contains no infrastructure code.

pub mod category;
pub mod clock;
pub mod dedup;
pub mod error;
pub mod event;
pub mod log;
pub mod repository;
