//! Shared test doubles for the Meridian event backbone.

mod clock;
mod events;
mod log;
mod store;

pub use clock::FixedClock;
pub use events::{
    asset_created, audit_trail, compliance_audit, entity_state_changed, fixed_time,
};
pub use log::{AckCounter, FailingEventLog, RecordingAck, RecordingEventLog, SentRecord};
pub use store::FailingEventStore;
