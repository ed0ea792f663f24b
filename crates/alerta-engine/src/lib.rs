//! The incident lifecycle engine and realtime fan-out.
//!
//! [`LifecycleEngine`] validates permissions and input, delegates exactly one
//! atomic call per operation to the incident store, and triggers
//! [`fanout::Notifier`] with an event tag and payload. Fan-out is strictly
//! best-effort: a mutation that has committed is never failed or rolled back
//! because a delivery went wrong.

pub mod engine;
pub mod event;
pub mod fanout;
pub mod guard;

pub use engine::{
  AdminListing, LifecycleEngine, ListFilter, NewIncidentInput, StaffMember,
  StatusCounts,
};
pub use event::{Envelope, EventType};
pub use fanout::{DeliveryError, DeliverySink, Notifier};
